//! lopdf adapter for drawing onto pages
//!
//! Image pages and text stamps are written as plain content streams. New
//! content is appended after the existing page content, wrapped in its own
//! graphics state so nothing set by the original page leaks into it.

use crate::error::{Error, Result};
use crate::pdf::imaging::probe_jpeg;
use crate::pdf::library::{EmbeddedImage, ImageCodec, PageComposer, PageSize, Placement, TextStamp};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// Inheritable page attributes are looked up at most this many levels up
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when a page declares no media box at all
const FALLBACK_PAGE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// lopdf-backed [`PageComposer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfComposer;

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn pages_root(doc: &Document) -> Result<ObjectId> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    Ok(doc.get_dictionary(root)?.get(b"Pages")?.as_reference()?)
}

fn page_id(doc: &Document, index: u32) -> Result<ObjectId> {
    doc.get_pages()
        .get(&(index + 1))
        .copied()
        .ok_or_else(|| Error::InvalidPdf {
            reason: format!("page index {} out of range", index),
        })
}

/// Find an attribute on the page or the nearest ancestor that defines it
fn inherited<'a>(doc: &'a Document, page: ObjectId, key: &[u8]) -> Result<Option<&'a Object>> {
    let mut current = Some(page);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = current else { break };
        let dict = doc.get_dictionary(id)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(None)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn embed_jpeg(doc: &mut Document, data: &[u8]) -> Result<EmbeddedImage> {
    let info = probe_jpeg(data)?;
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => info.width as i64,
        "Height" => info.height as i64,
        "BitsPerComponent" => info.bits_per_component as i64,
        "Filter" => "DCTDecode",
    };
    match info.components {
        1 => dict.set("ColorSpace", "DeviceGray"),
        3 => dict.set("ColorSpace", "DeviceRGB"),
        4 => {
            dict.set("ColorSpace", "DeviceCMYK");
            // Adobe CMYK JPEGs are stored inverted
            dict.set(
                "Decode",
                (0..4)
                    .flat_map(|_| [Object::Integer(1), Object::Integer(0)])
                    .collect::<Vec<_>>(),
            );
        }
        n => {
            return Err(Error::UnsupportedImage {
                reason: format!("JPEG with {} color components", n),
            })
        }
    }
    let id = doc.add_object(Stream::new(dict, data.to_vec()));
    Ok(EmbeddedImage {
        id,
        width: info.width,
        height: info.height,
    })
}

fn embed_png(doc: &mut Document, data: &[u8]) -> Result<EmbeddedImage> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Png)?;
    let (width, height) = (decoded.width(), decoded.height());

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if decoded.color().has_alpha() {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p[3]).collect();
        let smask = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        let smask_id = doc.add_object(Stream::new(smask, deflate(&alpha)?));
        dict.set("SMask", smask_id);
    }

    let rgb = decoded.to_rgb8();
    let id = doc.add_object(Stream::new(dict, deflate(rgb.as_raw())?));
    Ok(EmbeddedImage { id, width, height })
}

/// Owned copy of `dict[key]` as a dictionary, resolving one reference
fn sub_dictionary(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<Dictionary> {
    match dict.get(key) {
        Ok(obj) => Ok(resolve(doc, obj)?.as_dict()?.clone()),
        Err(_) => Ok(Dictionary::new()),
    }
}

/// Current content streams of a page, flattened to a list of references
fn content_refs(doc: &Document, page: ObjectId) -> Result<Vec<Object>> {
    let contents = match doc.get_dictionary(page)?.get(b"Contents") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };
    Ok(match contents {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    })
}

impl PageComposer for LopdfComposer {
    type Document = Document;

    fn create(&self) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn load(&self, data: &[u8]) -> Result<Document> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }
        Ok(Document::load_mem(data)?)
    }

    fn page_count(&self, doc: &Document) -> u32 {
        doc.get_pages().len() as u32
    }

    fn page_size(&self, doc: &Document, index: u32) -> Result<PageSize> {
        let page = page_id(doc, index)?;
        let Some(media_box) = inherited(doc, page, b"MediaBox")? else {
            return Ok(FALLBACK_PAGE);
        };
        let values: Vec<f32> = media_box
            .as_array()?
            .iter()
            .filter_map(|v| resolve(doc, v).ok().and_then(number))
            .collect();
        if values.len() != 4 {
            return Err(Error::InvalidPdf {
                reason: "malformed MediaBox".to_string(),
            });
        }
        Ok(PageSize {
            width: (values[2] - values[0]).abs(),
            height: (values[3] - values[1]).abs(),
        })
    }

    fn embed_image(
        &self,
        doc: &mut Document,
        data: &[u8],
        codec: ImageCodec,
    ) -> Result<EmbeddedImage> {
        match codec {
            ImageCodec::Jpeg => embed_jpeg(doc, data),
            ImageCodec::Png => embed_png(doc, data),
        }
    }

    fn add_image_page(
        &self,
        doc: &mut Document,
        size: PageSize,
        image: &EmbeddedImage,
        placement: Placement,
    ) -> Result<()> {
        let pages_id = pages_root(doc)?;

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(placement.width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(placement.height),
                        Object::Real(placement.x),
                        Object::Real(placement.y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(size.width),
                Object::Real(size.height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image.id },
            },
        });

        let pages = doc.get_object_mut(pages_id)?.as_dict_mut()?;
        let mut kids = pages
            .get(b"Kids")
            .and_then(Object::as_array)
            .cloned()
            .unwrap_or_default();
        kids.push(Object::Reference(page_id));
        pages.set("Count", kids.len() as i64);
        pages.set("Kids", kids);
        Ok(())
    }

    fn draw_text(
        &self,
        doc: &mut Document,
        index: u32,
        stamp: &TextStamp,
        x: f32,
        y: f32,
    ) -> Result<()> {
        let page = page_id(doc, index)?;

        let gs_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(stamp.opacity),
            "CA" => Object::Real(stamp.opacity),
        });
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let gs_name = format!("ZivaGS{}", gs_id.0);
        let font_name = format!("ZivaF{}", font_id.0);

        let mut resources = match inherited(doc, page, b"Resources")? {
            Some(obj) => obj.as_dict()?.clone(),
            None => Dictionary::new(),
        };
        let mut states = sub_dictionary(doc, &resources, b"ExtGState")?;
        states.set(gs_name.clone(), gs_id);
        resources.set("ExtGState", states);
        let mut fonts = sub_dictionary(doc, &resources, b"Font")?;
        fonts.set(font_name.clone(), font_id);
        resources.set("Font", fonts);

        let (sin, cos) = stamp.rotate_degrees.to_radians().sin_cos();
        let content = Content {
            operations: vec![
                Operation::new("Q", vec![]),
                Operation::new("q", vec![]),
                Operation::new("gs", vec![Object::Name(gs_name.into_bytes())]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(font_name.into_bytes()), Object::Real(stamp.size)],
                ),
                Operation::new(
                    "rg",
                    vec![
                        Object::Real(stamp.color.0),
                        Object::Real(stamp.color.1),
                        Object::Real(stamp.color.2),
                    ],
                ),
                Operation::new(
                    "Tm",
                    vec![
                        Object::Real(cos),
                        Object::Real(sin),
                        Object::Real(-sin),
                        Object::Real(cos),
                        Object::Real(x),
                        Object::Real(y),
                    ],
                ),
                Operation::new("Tj", vec![Object::string_literal(stamp.text.as_str())]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };

        let mut contents = vec![Object::Reference(
            doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec())),
        )];
        contents.extend(content_refs(doc, page)?);
        contents.push(Object::Reference(
            doc.add_object(Stream::new(dictionary! {}, content.encode()?)),
        ));

        let page_dict = doc.get_object_mut(page)?.as_dict_mut()?;
        page_dict.set("Resources", resources);
        page_dict.set("Contents", contents);
        Ok(())
    }

    fn save(&self, doc: &mut Document) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
