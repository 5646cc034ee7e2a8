//! quick-xml parsing for the two BGG XMLAPI2 payloads we consume:
//! `/search` result lists and `/thing` detail documents.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
}

/// One `/search` hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub id: String,
    pub name: String,
    pub year: Option<String>,
}

/// One `/thing` item, still raw: description keeps BGG's markup and entity
/// encoding, list fields are untruncated.
#[derive(Debug, Clone, Default)]
pub struct ThingItem {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub min_players: i32,
    pub max_players: i32,
    pub play_time: i32,
    pub min_age: i32,
    pub bgg_rating: f64,
    pub complexity: f64,
    pub designers: Vec<String>,
    pub categories: Vec<String>,
    pub description: String,
}

pub fn parse_search(body: &[u8]) -> Result<Vec<SearchItem>, ParseError> {
    let mut xml = Reader::from_reader(body);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<SearchItem> = None;
    let mut has_primary_name = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"item" => {
                    current = Some(SearchItem {
                        id: attr(e, b"id")?.unwrap_or_default(),
                        name: String::new(),
                        year: None,
                    });
                    has_primary_name = false;
                }
                b"name" => {
                    if let Some(ref mut item) = current {
                        let is_primary = attr(e, b"type")?.as_deref() == Some("primary");
                        // Keep the first name; a later primary overrides an
                        // alternate seen before it.
                        if item.name.is_empty() || (is_primary && !has_primary_name) {
                            if let Some(value) = attr(e, b"value")? {
                                item.name = value;
                                has_primary_name = is_primary;
                            }
                        }
                    }
                }
                b"yearpublished" => {
                    if let Some(ref mut item) = current {
                        item.year = attr(e, b"value")?;
                    }
                }
                _ => {}
            },
            Event::End(ref e) => {
                if e.name().as_ref() == b"item" {
                    if let Some(mut item) = current.take() {
                        if item.name.is_empty() {
                            item.name = "Unknown".to_string();
                        }
                        items.push(item);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

pub fn parse_things(body: &[u8]) -> Result<Vec<ThingItem>, ParseError> {
    let mut xml = Reader::from_reader(body);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<ThingItem> = None;
    let mut text_target = TextTarget::None;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"item" => {
                    let mut item = ThingItem::default();
                    item.id = attr(e, b"id")?.unwrap_or_default();
                    item.min_players = 1;
                    item.max_players = 1;
                    current = Some(item);
                }
                b"thumbnail" => text_target = TextTarget::Thumbnail,
                b"image" => text_target = TextTarget::Image,
                b"description" => text_target = TextTarget::Description,
                _ => {}
            },
            Event::Empty(ref e) => {
                if let Some(ref mut item) = current {
                    fill_from_empty(item, e)?;
                }
            }
            Event::Text(ref e) => {
                if let Some(ref mut item) = current {
                    let text = e.unescape()?.to_string();
                    match text_target {
                        TextTarget::Thumbnail => item.thumbnail = Some(text),
                        TextTarget::Image => item.image = Some(text),
                        TextTarget::Description => item.description.push_str(&text),
                        TextTarget::None => {}
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"item" => {
                    if let Some(mut item) = current.take() {
                        if item.title.is_empty() {
                            item.title = "Unknown Game".to_string();
                        }
                        items.push(item);
                    }
                }
                b"thumbnail" | b"image" | b"description" => text_target = TextTarget::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

#[derive(Clone, Copy)]
enum TextTarget {
    None,
    Thumbnail,
    Image,
    Description,
}

fn fill_from_empty(item: &mut ThingItem, e: &BytesStart<'_>) -> Result<(), ParseError> {
    match e.name().as_ref() {
        b"name" => {
            if attr(e, b"type")?.as_deref() == Some("primary") {
                if let Some(value) = attr(e, b"value")? {
                    item.title = value;
                }
            }
        }
        b"yearpublished" => item.year = attr_num(e)?,
        b"minplayers" => item.min_players = attr_num(e)?,
        b"maxplayers" => item.max_players = attr_num(e)?,
        b"playingtime" => item.play_time = attr_num(e)?,
        b"minage" => item.min_age = attr_num(e)?,
        b"average" => item.bgg_rating = attr_float(e)?,
        b"averageweight" => item.complexity = attr_float(e)?,
        b"link" => match attr(e, b"type")?.as_deref() {
            Some("boardgamedesigner") => {
                if let Some(value) = attr(e, b"value")? {
                    item.designers.push(value);
                }
            }
            Some("boardgamecategory") => {
                if let Some(value) = attr(e, b"value")? {
                    item.categories.push(value);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, ParseError> {
    for a in e.attributes() {
        let a = a?;
        if a.key.as_ref() == key {
            return Ok(Some(String::from_utf8_lossy(&a.value).to_string()));
        }
    }
    Ok(None)
}

// BGG occasionally ships junk values ("Not Ranked"); fall back to zero the
// way the original importer did rather than failing the whole document.
fn attr_num(e: &BytesStart<'_>) -> Result<i32, ParseError> {
    Ok(attr(e, b"value")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

fn attr_float(e: &BytesStart<'_>) -> Result<f64, ParseError> {
    Ok(attr(e, b"value")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0))
}
