use std::collections::BTreeMap;

use lopdf::{
    Dictionary, Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};

use crate::{
    document::{
        DEFAULT_PAGE, DocumentBackend, EmbeddedImage, PageSize, RasterFormat, TextOptions,
    },
    document_record::decode_raster,
    error::{CalqueError, CalqueResult},
};

/// Real PDF encoder over `lopdf`. Text runs and image placements are
/// buffered per page and flushed into the page content streams at `finish`,
/// so existing template content is decoded exactly once.
#[derive(Default)]
pub struct PdfBackend {
    state: Option<State>,
}

struct State {
    inner: Document,
    pages_root: ObjectId,
    current_page: ObjectId,
    page_size: PageSize,
    font_id: Option<ObjectId>,
    pending: BTreeMap<ObjectId, Vec<Operation>>,
    images: Vec<StoredImage>,
}

#[derive(Clone, Copy)]
struct StoredImage {
    object: ObjectId,
}

impl PdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> CalqueResult<&mut State> {
        self.state
            .as_mut()
            .ok_or_else(|| CalqueError::document("no document has been started"))
    }
}

impl DocumentBackend for PdfBackend {
    fn load_template(&mut self, bytes: &[u8]) -> CalqueResult<()> {
        let inner = Document::load_mem(bytes).map_err(|e| {
            CalqueError::template_not_found(format!("template could not be parsed: {e}"))
        })?;

        let pages = inner.get_pages();
        let Some((_, &first_page)) = pages.iter().next() else {
            return Err(CalqueError::template_not_found("template has no pages"));
        };

        let pages_root = inner
            .catalog()
            .and_then(|c| c.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|e| {
                CalqueError::template_not_found(format!("template has no page tree: {e}"))
            })?;

        let page_size =
            inherited_media_box(&inner, first_page).unwrap_or(DEFAULT_PAGE);

        self.state = Some(State {
            inner,
            pages_root,
            current_page: first_page,
            page_size,
            font_id: None,
            pending: BTreeMap::new(),
            images: Vec::new(),
        });
        Ok(())
    }

    fn create_blank(&mut self, size: PageSize) -> CalqueResult<()> {
        let mut inner = Document::with_version("1.5");
        let pages_root = inner.new_object_id();
        let content_id = inner.add_object(Object::Stream(Stream::new(dictionary! {}, Vec::new())));
        let page_id = inner.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_root,
            "MediaBox" => media_box(size),
            "Contents" => content_id,
        });
        inner.objects.insert(
            pages_root,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = inner.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_root,
        });
        inner.trailer.set("Root", catalog_id);

        self.state = Some(State {
            inner,
            pages_root,
            current_page: page_id,
            page_size: size,
            font_id: None,
            pending: BTreeMap::new(),
            images: Vec::new(),
        });
        Ok(())
    }

    fn add_page(&mut self) -> CalqueResult<()> {
        let state = self.state_mut()?;
        let content_id = state
            .inner
            .add_object(Object::Stream(Stream::new(dictionary! {}, Vec::new())));
        let page_id = state.inner.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => state.pages_root,
            "MediaBox" => media_box(state.page_size),
            "Contents" => content_id,
        });
        attach_page(&mut state.inner, state.pages_root, page_id)?;
        state.current_page = page_id;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.state
            .as_ref()
            .map(|s| s.inner.get_pages().len())
            .unwrap_or(0)
    }

    fn draw_text(&mut self, text: &str, opts: TextOptions) -> CalqueResult<()> {
        let state = self.state_mut()?;
        let font_id = match state.font_id {
            Some(id) => id,
            None => {
                let id = state.inner.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                });
                state.font_id = Some(id);
                id
            }
        };
        ensure_page_resource(&mut state.inner, state.current_page, "Font", "F1", font_id)?;

        let [r, g, b] = opts.rgb;
        let ops = state.pending.entry(state.current_page).or_default();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec!["F1".into(), Object::Real(opts.size as f32)],
        ));
        ops.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        ops.push(Operation::new(
            "Td",
            vec![Object::Real(opts.x as f32), Object::Real(opts.y as f32)],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(
                win_ansi(text),
                lopdf::StringFormat::Literal,
            )],
        ));
        ops.push(Operation::new("ET", vec![]));
        Ok(())
    }

    fn embed_image(&mut self, bytes: &[u8], format: RasterFormat) -> CalqueResult<EmbeddedImage> {
        let (width, height) = decode_raster(bytes, format)?;
        let state = self.state_mut()?;

        let stream = match format {
            RasterFormat::Jpeg => {
                let img = image::load_from_memory(bytes).map_err(|e| {
                    CalqueError::attachment_decode(format!("raster decode failed: {e}"))
                })?;
                let color_space = match img.color() {
                    image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
                    _ => "DeviceRGB",
                };
                // Baseline JPEG passes through untouched as a DCT stream.
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width as i64,
                        "Height" => height as i64,
                        "ColorSpace" => color_space,
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    bytes.to_vec(),
                )
            }
            RasterFormat::Png => {
                let img = image::load_from_memory(bytes).map_err(|e| {
                    CalqueError::attachment_decode(format!("raster decode failed: {e}"))
                })?;
                let raw = img.to_rgb8().into_raw();
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width as i64,
                        "Height" => height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                    },
                    raw,
                )
            }
        };

        let object = state.inner.add_object(Object::Stream(stream));
        let key = state.images.len();
        state.images.push(StoredImage { object });
        Ok(EmbeddedImage { key, width, height })
    }

    fn place_image(
        &mut self,
        image: &EmbeddedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> CalqueResult<()> {
        let state = self.state_mut()?;
        let Some(stored) = state.images.get(image.key).copied() else {
            return Err(CalqueError::document("image was never embedded"));
        };
        let name = format!("Im{}", image.key);
        ensure_page_resource(
            &mut state.inner,
            state.current_page,
            "XObject",
            &name,
            stored.object,
        )?;

        let ops = state.pending.entry(state.current_page).or_default();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                Object::Real(width as f32),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(height as f32),
                Object::Real(x as f32),
                Object::Real(y as f32),
            ],
        ));
        ops.push(Operation::new("Do", vec![name.as_str().into()]));
        ops.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn append_document(&mut self, bytes: &[u8]) -> CalqueResult<usize> {
        let state = self.state_mut()?;
        let mut sub = Document::load_mem(bytes).map_err(|e| {
            CalqueError::sub_document_load(format!("sub-document could not be parsed: {e}"))
        })?;
        if sub.get_pages().is_empty() {
            return Err(CalqueError::sub_document_load("sub-document has no pages"));
        }

        // Page dictionaries leave their own tree, so attributes inherited
        // from ancestor nodes must be pulled down onto each page first.
        let sub_pages: Vec<ObjectId> = sub.get_pages().into_values().collect();
        for &pid in &sub_pages {
            pull_down_inherited(&mut sub, pid);
        }

        sub.renumber_objects_with(state.inner.max_id + 1);
        let sub_pages: Vec<ObjectId> = sub.get_pages().into_values().collect();

        for (id, object) in std::mem::take(&mut sub.objects) {
            if dict_type(&object) == Some(b"Catalog".as_slice()) {
                continue;
            }
            state.inner.objects.insert(id, object);
        }
        state.inner.max_id = state
            .inner
            .objects
            .keys()
            .map(|(n, _)| *n)
            .max()
            .unwrap_or(state.inner.max_id);

        for &pid in &sub_pages {
            {
                let page = state
                    .inner
                    .get_object_mut(pid)
                    .and_then(Object::as_dict_mut)
                    .map_err(|e| CalqueError::document(format!("broken sub-document page: {e}")))?;
                page.set("Parent", state.pages_root);
            }
            attach_page(&mut state.inner, state.pages_root, pid)?;
        }

        Ok(sub_pages.len())
    }

    fn finish(&mut self) -> CalqueResult<Vec<u8>> {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| CalqueError::document("no document has been started"))?;

        for (page_id, ops) in std::mem::take(&mut state.pending) {
            let mut content = existing_content(&state.inner, page_id)?;
            content.operations.extend(ops);
            let encoded = content
                .encode()
                .map_err(|e| CalqueError::document(format!("content encode failed: {e}")))?;
            state
                .inner
                .change_page_content(page_id, encoded)
                .map_err(|e| CalqueError::document(format!("content update failed: {e}")))?;
        }

        let mut out = Vec::new();
        state
            .inner
            .save_to(&mut out)
            .map_err(|e| CalqueError::document(format!("document serialize failed: {e}")))?;
        Ok(out)
    }

    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn suggested_extension(&self) -> &'static str {
        "pdf"
    }
}

fn media_box(size: PageSize) -> Vec<Object> {
    vec![
        Object::Real(0.0),
        Object::Real(0.0),
        Object::Real(size.width as f32),
        Object::Real(size.height as f32),
    ]
}

fn dict_type(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Dictionary(d) => d.get(b"Type").and_then(Object::as_name).ok(),
        _ => None,
    }
}

fn as_number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// The page's MediaBox, walking up the Parent chain when the page itself
/// does not carry one.
fn inherited_media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let object = inherited_attribute(doc, page_id, b"MediaBox")?;
    let resolved = match &object {
        Object::Reference(id) => doc.get_object(*id).ok()?.clone(),
        other => other.clone(),
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let nums: Vec<f64> = arr.iter().filter_map(as_number).collect();
    if nums.len() != 4 {
        return None;
    }
    Some(PageSize {
        width: nums[2] - nums[0],
        height: nums[3] - nums[1],
    })
}

fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..32 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// Copies the inheritable page-tree attributes onto the page dictionary
/// itself, so the page survives being reparented into another tree.
fn pull_down_inherited(doc: &mut Document, page_id: ObjectId) {
    const KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"Rotate", b"CropBox"];
    let mut found: Vec<(&[u8], Object)> = Vec::new();
    for key in KEYS {
        let already = doc
            .get_dictionary(page_id)
            .map(|d| d.has(key))
            .unwrap_or(true);
        if already {
            continue;
        }
        if let Some(value) = inherited_attribute(doc, page_id, key) {
            found.push((key, value));
        }
    }
    if found.is_empty() {
        return;
    }
    if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        for (key, value) in found {
            page.set(key, value);
        }
    }
}

/// Registers `page_id` as a new last child of the root page tree node.
fn attach_page(doc: &mut Document, pages_root: ObjectId, page_id: ObjectId) -> CalqueResult<()> {
    let pages = doc
        .get_object_mut(pages_root)
        .and_then(Object::as_dict_mut)
        .map_err(|e| CalqueError::document(format!("broken page tree: {e}")))?;

    match pages.get_mut(b"Kids").and_then(Object::as_array_mut) {
        Ok(kids) => kids.push(Object::Reference(page_id)),
        Err(_) => {
            pages.set("Kids", vec![Object::Reference(page_id)]);
        }
    }

    let count = pages
        .get(b"Count")
        .ok()
        .and_then(as_number)
        .unwrap_or(0.0) as i64;
    pages.set("Count", count + 1);
    Ok(())
}

enum ResourcesLocation {
    Missing,
    Inline,
    Referenced(ObjectId),
}

/// Ensures `/{category}/{name}` in the page's resource dictionary points at
/// `target`. Creates the resource dictionary (or the category subdictionary)
/// when the page has neither; template pages commonly keep resources behind
/// a reference, which is followed one level.
fn ensure_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    target: ObjectId,
) -> CalqueResult<()> {
    let location = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| CalqueError::document(format!("broken page: {e}")))?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => ResourcesLocation::Referenced(*id),
            Ok(Object::Dictionary(_)) => ResourcesLocation::Inline,
            _ => ResourcesLocation::Missing,
        }
    };

    let res_err = |e| CalqueError::document(format!("broken resources: {e}"));
    match location {
        ResourcesLocation::Missing => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(res_err)?;
            page.set(
                "Resources",
                dictionary! { category => dictionary! { name => target } },
            );
            Ok(())
        }
        ResourcesLocation::Inline => {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(res_err)?;
            let res = page
                .get_mut(b"Resources")
                .and_then(Object::as_dict_mut)
                .map_err(res_err)?;
            set_resource_entry(res, category, name, target);
            Ok(())
        }
        ResourcesLocation::Referenced(res_id) => {
            let res = doc
                .get_object_mut(res_id)
                .and_then(Object::as_dict_mut)
                .map_err(res_err)?;
            set_resource_entry(res, category, name, target);
            Ok(())
        }
    }
}

fn set_resource_entry(res: &mut Dictionary, category: &str, name: &str, target: ObjectId) {
    match res.get_mut(category.as_bytes()).ok() {
        Some(Object::Dictionary(d)) => d.set(name, target),
        _ => res.set(category, dictionary! { name => target }),
    }
}

fn existing_content(doc: &Document, page_id: ObjectId) -> CalqueResult<Content> {
    let data = doc.get_page_content(page_id).unwrap_or_default();
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Content {
            operations: Vec::new(),
        });
    }
    Content::decode(&data)
        .map_err(|e| CalqueError::document(format!("content decode failed: {e}")))
}

/// Helvetica text travels as WinAnsi (latin-1 superset) literal strings;
/// anything outside that range degrades to '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let u = c as u32;
            if u <= 0xFF { u as u8 } else { b'?' }
        })
        .collect()
}
