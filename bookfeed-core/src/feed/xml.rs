//! XML generation for OPDS Atom feeds
//!
//! Uses quick-xml to generate well-formed Atom XML with the Dublin Core and
//! calibre extensions.

use super::types::{ns, CatalogFeed, FeedEntry, FeedLink};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Render a catalog feed to Atom XML
pub fn render_feed(feed: &CatalogFeed) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    // XML declaration
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    // Root feed element with namespaces
    let mut feed_elem = BytesStart::new("feed");
    feed_elem.push_attribute(("xmlns", ns::ATOM));
    feed_elem.push_attribute(("xmlns:dc", ns::DC));
    feed_elem.push_attribute(("xmlns:calibre", ns::CALIBRE));
    writer.write_event(Event::Start(feed_elem))?;

    write_text_element(&mut writer, "updated", &timestamp(&feed.updated))?;
    write_optional_element(&mut writer, "id", feed.id.as_deref())?;
    write_optional_element(&mut writer, "title", feed.title.as_deref())?;
    write_optional_element(&mut writer, "subtitle", feed.subtitle.as_deref())?;
    write_optional_element(&mut writer, "icon", feed.icon.as_deref())?;

    // Feed author
    if !feed.author.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("author")))?;
        write_optional_element(&mut writer, "name", feed.author.name.as_deref())?;
        write_optional_element(&mut writer, "uri", feed.author.uri.as_deref())?;
        write_optional_element(&mut writer, "email", feed.author.email.as_deref())?;
        writer.write_event(Event::End(BytesEnd::new("author")))?;
    }

    for entry in &feed.entries {
        write_entry(&mut writer, entry)?;
    }

    writer.write_event(Event::End(BytesEnd::new("feed")))?;

    let mut result = writer.into_inner().into_inner();
    result.push(b'\n');
    Ok(String::from_utf8(result)?)
}

fn timestamp(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Write a simple text element
fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    content: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(content)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_optional_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    content: Option<&str>,
) -> Result<(), quick_xml::Error> {
    match content {
        Some(content) => write_text_element(writer, name, content),
        None => Ok(()),
    }
}

fn write_link<W: std::io::Write>(writer: &mut Writer<W>, link: &FeedLink) -> Result<(), quick_xml::Error> {
    let mut elem = BytesStart::new("link");
    elem.push_attribute(("href", link.href.as_str()));
    elem.push_attribute(("type", link.media_type.as_str()));
    elem.push_attribute(("rel", link.rel.as_str()));
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

fn write_entry<W: std::io::Write>(writer: &mut Writer<W>, entry: &FeedEntry) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new("entry")))?;

    write_text_element(writer, "id", &entry.id)?;
    write_text_element(writer, "updated", &timestamp(&entry.updated))?;
    write_text_element(writer, "title", &entry.title)?;

    // Dublin Core and calibre extensions
    write_optional_element(writer, "dc:language", entry.language.as_deref())?;
    write_optional_element(writer, "calibre:series", entry.series.as_deref())?;
    write_optional_element(writer, "calibre:series_index", entry.series_index.as_deref())?;

    if let Some(ref summary) = entry.summary {
        let mut elem = BytesStart::new("summary");
        elem.push_attribute(("type", "html"));
        writer.write_event(Event::Start(elem))?;
        writer.write_event(Event::Text(BytesText::new(summary)))?;
        writer.write_event(Event::End(BytesEnd::new("summary")))?;
    }

    for author in &entry.authors {
        writer.write_event(Event::Start(BytesStart::new("author")))?;
        write_text_element(writer, "name", &author.name)?;
        write_text_element(writer, "uri", &author.uri)?;
        writer.write_event(Event::End(BytesEnd::new("author")))?;
    }

    for category in &entry.categories {
        let mut elem = BytesStart::new("category");
        elem.push_attribute(("term", category.as_str()));
        elem.push_attribute(("label", category.as_str()));
        writer.write_event(Event::Empty(elem))?;
    }

    for link in &entry.links {
        write_link(writer, link)?;
    }

    writer.write_event(Event::End(BytesEnd::new("entry")))?;
    Ok(())
}
