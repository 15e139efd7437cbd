//! Signature field, widget and placeholder reservation.

use chrono::{DateTime, Utc};
use fse_core::{Container, Dictionary, Error, Object, ObjectId, Result, Slot};

/// Width-stable value written into `/ByteRange` until the real spans are known.
pub const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

/// Default `/Contents` reservation in bytes (hex doubles it on disk).
pub const DEFAULT_RESERVED_SIZE: usize = 16_384;

/// Default signature field name.
pub const DEFAULT_FIELD_NAME: &str = "Signature1";

/// Annotation flags: print + locked.
const WIDGET_FLAGS: i64 = 132;

/// AcroForm `/SigFlags`: signatures exist + append only.
const SIG_FLAGS: i64 = 3;

/// `/SubFilter` of the signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubFilter {
    #[default]
    CadesDetached,
}

impl SubFilter {
    pub fn as_name(&self) -> &'static str {
        match self {
            SubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }
}

/// Options for [`reserve_placeholder`].
#[derive(Debug, Clone)]
pub struct SignatureOptions {
    pub field_name: String,
    /// Bytes reserved for the DER-encoded CMS structure.
    pub reserved_size: usize,
    /// Written as `/M`.
    pub signing_time: DateTime<Utc>,
    pub sub_filter: SubFilter,
    pub signer_name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            field_name: DEFAULT_FIELD_NAME.to_string(),
            reserved_size: DEFAULT_RESERVED_SIZE,
            signing_time: Utc::now(),
            sub_filter: SubFilter::default(),
            signer_name: None,
            reason: None,
            location: None,
            contact_info: None,
        }
    }
}

/// Objects created by [`reserve_placeholder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderRef {
    /// Merged signature field and widget annotation.
    pub field: ObjectId,
    /// Signature dictionary holding `/Contents` and `/ByteRange`.
    pub signature: ObjectId,
    pub reserved_size: usize,
}

/// A container with a reserved signature slot.
///
/// Read-only; the next step is [`crate::finalize_byte_range`].
#[derive(Debug)]
pub struct ReservedSignature {
    pub(crate) container: Container,
    pub(crate) placeholder: PlaceholderRef,
    pub(crate) field_name: String,
}

impl ReservedSignature {
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn placeholder(&self) -> PlaceholderRef {
        self.placeholder
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

/// Append a signature dictionary and a field/widget pointing at it.
#[tracing::instrument(skip(container, options), fields(
    field = %options.field_name,
    reserved = options.reserved_size,
))]
pub fn reserve_placeholder(
    mut container: Container,
    options: &SignatureOptions,
) -> Result<ReservedSignature> {
    if options.field_name.is_empty() {
        return Err(Error::InvalidInput("signature field name must not be empty".into()));
    }
    if options.reserved_size == 0 {
        return Err(Error::InvalidInput("signature reservation must be positive".into()));
    }

    let catalog_id = container.catalog_id();
    let catalog = container.catalog()?.clone();
    let acroform = container.entry_dict(&catalog, b"AcroForm")?;
    let fields = match &acroform {
        Some((_, form)) => container.entry_array(form, b"Fields")?,
        None => None,
    };
    if let Some((_, fields)) = &fields {
        check_field_name(&container, fields, &options.field_name)?;
    }

    let page_id = *container
        .page_ids()?
        .first()
        .ok_or_else(|| Error::ContainerTooComplex("document has no pages".into()))?;

    let signature_id = container.add_object(signature_dictionary(options));
    let field_id = container.add_object(
        Dictionary::new()
            .with("Type", Object::name("Annot"))
            .with("Subtype", Object::name("Widget"))
            .with("FT", Object::name("Sig"))
            .with("T", Object::text(&options.field_name))
            .with("V", signature_id)
            .with("Rect", vec![Object::from(0), 0.into(), 0.into(), 0.into()])
            .with("F", WIDGET_FLAGS)
            .with("P", page_id),
    );

    // Widget goes on the first page.
    let page = container
        .get(page_id)
        .and_then(Object::as_dict)
        .ok_or_else(|| Error::ContainerTooComplex(format!("page {page_id} is not a dictionary")))?
        .clone();
    match container.entry_array(&page, b"Annots")? {
        Some((slot, mut annots)) => {
            annots.push(field_id.into());
            container.put_entry(page_id, b"Annots", slot, annots)?;
        }
        None => container.dict_mut(page_id)?.set(b"Annots", vec![Object::from(field_id)]),
    }

    // Field goes into the AcroForm, which is created if absent.
    match acroform {
        Some((form_slot, mut form)) => {
            match fields {
                Some((Slot::Indirect(fields_id), mut items)) => {
                    items.push(field_id.into());
                    container.update_object(fields_id, items)?;
                }
                Some((Slot::Inline, mut items)) => {
                    items.push(field_id.into());
                    form.set(b"Fields", items);
                }
                None => form.set(b"Fields", vec![Object::from(field_id)]),
            }
            form.set(b"SigFlags", SIG_FLAGS);
            container.put_entry(catalog_id, b"AcroForm", form_slot, form)?;
        }
        None => {
            let form = container.add_object(
                Dictionary::new()
                    .with("Fields", vec![Object::from(field_id)])
                    .with("SigFlags", SIG_FLAGS),
            );
            container.set_catalog_entry(b"AcroForm", form)?;
        }
    }

    tracing::info!(%signature_id, %field_id, %page_id, "Reserved signature placeholder");
    Ok(ReservedSignature {
        container,
        placeholder: PlaceholderRef {
            field: field_id,
            signature: signature_id,
            reserved_size: options.reserved_size,
        },
        field_name: options.field_name.clone(),
    })
}

fn signature_dictionary(options: &SignatureOptions) -> Dictionary {
    let mut sig = Dictionary::new()
        .with("Type", Object::name("Sig"))
        .with("Filter", Object::name("Adobe.PPKLite"))
        .with("SubFilter", Object::name(options.sub_filter.as_name()))
        .with(
            "ByteRange",
            vec![
                Object::from(0),
                BYTE_RANGE_PLACEHOLDER.into(),
                BYTE_RANGE_PLACEHOLDER.into(),
                BYTE_RANGE_PLACEHOLDER.into(),
            ],
        )
        .with("Contents", Object::hex_string(vec![0u8; options.reserved_size]))
        .with("M", Object::date(options.signing_time));
    let optional = [
        ("Name", &options.signer_name),
        ("Reason", &options.reason),
        ("Location", &options.location),
        ("ContactInfo", &options.contact_info),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            sig.set(key, Object::text(value));
        }
    }
    sig
}

/// Refuse to add a field whose name is already taken.
fn check_field_name(container: &Container, fields: &[Object], name: &str) -> Result<()> {
    for field in fields {
        let Some(dict) = container.resolve(field).as_dict() else {
            continue;
        };
        let title = dict
            .get(b"T")
            .map(|t| container.resolve(t))
            .and_then(Object::as_string_bytes)
            .map(fse_core::object::decode_text_string);
        if title.as_deref() != Some(name) {
            continue;
        }
        let is_signature = dict.get_name(b"FT") == Some(&b"Sig"[..]);
        let signed = dict
            .get(b"V")
            .is_some_and(|v| !matches!(container.resolve(v), Object::Null));
        let reason = match (is_signature, signed) {
            (true, false) => format!("unsigned signature field '{name}' is unresolved"),
            (true, true) => format!("signature field '{name}' is already signed"),
            (false, _) => format!("field '{name}' already exists and is not a signature field"),
        };
        return Err(Error::ContainerTooComplex(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fse_core::fixtures;

    fn options(reserved_size: usize) -> SignatureOptions {
        SignatureOptions {
            reserved_size,
            ..SignatureOptions::default()
        }
    }

    #[test]
    fn placeholder_reserves_zero_digits() {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        let reserved = reserve_placeholder(container, &options(8192)).unwrap();
        let sig = reserved
            .container()
            .get(reserved.placeholder().signature)
            .and_then(Object::as_dict)
            .unwrap();
        assert_eq!(
            sig.get(b"Contents"),
            Some(&Object::hex_string(vec![0u8; 8192]))
        );
        assert_eq!(sig.get_name(b"SubFilter"), Some(&b"ETSI.CAdES.detached"[..]));
        assert_eq!(reserved.placeholder().reserved_size, 8192);
    }

    #[test]
    fn field_is_linked_from_page_and_acroform() {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        let reserved = reserve_placeholder(container, &options(64)).unwrap();
        let doc = reserved.container();
        let field = reserved.placeholder().field;

        let page = doc.get(ObjectId::new(3, 0)).and_then(Object::as_dict).unwrap();
        assert_eq!(
            page.get(b"Annots").and_then(Object::as_array),
            Some(&vec![Object::from(field)])
        );
        let catalog = doc.catalog().unwrap();
        let (_, form) = doc.entry_dict(catalog, b"AcroForm").unwrap().unwrap();
        assert_eq!(form.get(b"SigFlags"), Some(&Object::Integer(3)));
        assert_eq!(
            form.get(b"Fields").and_then(Object::as_array),
            Some(&vec![Object::from(field)])
        );
    }

    #[test]
    fn existing_field_names_are_refused() {
        let mut container = Container::load(fixtures::minimal_pdf()).unwrap();
        let unsigned = container.add_object(
            Dictionary::new()
                .with("FT", Object::name("Sig"))
                .with("T", Object::string("Signature1")),
        );
        let text = container.add_object(
            Dictionary::new()
                .with("FT", Object::name("Tx"))
                .with("T", Object::string("Notes")),
        );
        let form = Dictionary::new().with("Fields", vec![Object::from(unsigned), text.into()]);
        container.set_catalog_entry(b"AcroForm", form).unwrap();

        let err = reserve_placeholder(container.clone(), &options(64)).unwrap_err();
        assert!(matches!(&err, Error::ContainerTooComplex(m) if m.contains("unresolved")));

        let notes = SignatureOptions {
            field_name: "Notes".into(),
            ..options(64)
        };
        let err = reserve_placeholder(container.clone(), &notes).unwrap_err();
        assert!(matches!(&err, Error::ContainerTooComplex(m) if m.contains("not a signature")));

        let fresh = SignatureOptions {
            field_name: "Signature2".into(),
            ..options(64)
        };
        let reserved = reserve_placeholder(container, &fresh).unwrap();
        let catalog = reserved.container().catalog().unwrap();
        let (_, form) = reserved.container().entry_dict(catalog, b"AcroForm").unwrap().unwrap();
        assert_eq!(form.get(b"Fields").and_then(Object::as_array).map(Vec::len), Some(3));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        assert!(matches!(
            reserve_placeholder(container.clone(), &options(0)),
            Err(Error::InvalidInput(_))
        ));
        let unnamed = SignatureOptions {
            field_name: String::new(),
            ..options(64)
        };
        assert!(matches!(
            reserve_placeholder(container, &unnamed),
            Err(Error::InvalidInput(_))
        ));
    }
}
