//! Associated files: embedded file streams registered in the `/EmbeddedFiles`
//! name tree and the catalog `/AF` array.

use crate::container::{Container, Slot};
use crate::nametree;
use crate::object::{Dictionary, Object, ObjectId, Stream, decode_text_string};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// `/AFRelationship` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Relationship {
    Source,
    Data,
    Alternative,
    Supplement,
    EncryptedPayload,
    FormData,
    Schema,
    Unspecified,
}

impl Relationship {
    pub const ALL: [Relationship; 8] = [
        Relationship::Source,
        Relationship::Data,
        Relationship::Alternative,
        Relationship::Supplement,
        Relationship::EncryptedPayload,
        Relationship::FormData,
        Relationship::Schema,
        Relationship::Unspecified,
    ];

    /// PDF name, without the leading slash.
    pub fn as_name(&self) -> &'static str {
        match self {
            Relationship::Source => "Source",
            Relationship::Data => "Data",
            Relationship::Alternative => "Alternative",
            Relationship::Supplement => "Supplement",
            Relationship::EncryptedPayload => "EncryptedPayload",
            Relationship::FormData => "FormData",
            Relationship::Schema => "Schema",
            Relationship::Unspecified => "Unspecified",
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_name().as_bytes() == name)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

impl FromStr for Relationship {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown relationship '{s}' (expected one of: {})",
                    Self::ALL.map(|r| r.as_name()).join(", ")
                ))
            })
    }
}

/// A payload to embed.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub payload: Vec<u8>,
    pub relationship: Relationship,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    /// Written as `/Params /ModDate`; the current time when unset.
    pub modified: Option<DateTime<Utc>>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        relationship: Relationship,
    ) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            relationship,
            mime_type: None,
            description: None,
            modified: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified = Some(at);
        self
    }
}

/// An embedded file read back from a document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    pub name: String,
    /// File specification object, when stored indirectly.
    pub filespec: Option<ObjectId>,
    pub relationship: Relationship,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

/// Embed `payload` under `name`.
pub fn attach(
    container: Container,
    name: &str,
    payload: &[u8],
    relationship: Relationship,
) -> Result<Container> {
    attach_with(container, &Attachment::new(name, payload, relationship))
}

/// Embed a file and register it in both the name tree and `/AF`.
#[tracing::instrument(skip(container, attachment), fields(
    name = %attachment.name,
    payload_len = attachment.payload.len(),
    relationship = %attachment.relationship,
))]
pub fn attach_with(mut container: Container, attachment: &Attachment) -> Result<Container> {
    let name = attachment.name.as_str();
    if name.is_empty() {
        return Err(Error::InvalidInput("embedded file name must not be empty".into()));
    }

    let catalog_id = container.catalog_id();
    let catalog = container.catalog()?.clone();
    let names = container.entry_dict(&catalog, b"Names")?;
    let tree = match &names {
        Some((_, names)) => container.entry_dict(names, b"EmbeddedFiles")?,
        None => None,
    };
    let af = container.entry_array(&catalog, b"AF")?;

    if let Some((_, root)) = &tree
        && nametree::lookup(&container, root, name)?.is_some()
    {
        return Err(Error::DuplicateAssociation(name.to_string()));
    }
    if let Some((_, items)) = &af
        && items.iter().any(|item| filespec_name(&container, item).as_deref() == Some(name))
    {
        return Err(Error::DuplicateAssociation(name.to_string()));
    }

    let file_id = container.add_object(embedded_file_stream(attachment)?);
    let mut filespec = Dictionary::new()
        .with("Type", Object::name("Filespec"))
        .with("F", Object::string(ascii_fallback(name)))
        .with("UF", Object::text(name))
        .with(
            "EF",
            Dictionary::new().with("F", file_id).with("UF", file_id),
        )
        .with("AFRelationship", Object::name(attachment.relationship.as_name()));
    if let Some(desc) = &attachment.description {
        filespec.set(b"Desc", Object::text(desc));
    }
    let filespec_id = container.add_object(filespec);

    // Name tree.
    let key = crate::object::encode_text_string(name);
    let (mut names_dict, names_slot) = match names {
        Some((slot, dict)) => (dict, Some(slot)),
        None => (Dictionary::new(), None),
    };
    match tree {
        Some((Slot::Indirect(root_id), root)) => {
            let root = nametree::insert(&mut container, root, &key, filespec_id.into())?;
            container.update_object(root_id, root)?;
        }
        existing => {
            let root = existing.map(|(_, root)| root).unwrap_or_default();
            let root = nametree::insert(&mut container, root, &key, filespec_id.into())?;
            let root_id = container.add_object(root);
            names_dict.set(b"EmbeddedFiles", root_id);
            match names_slot {
                Some(slot) => container.put_entry(catalog_id, b"Names", slot, names_dict)?,
                None => container.set_catalog_entry(b"Names", names_dict)?,
            }
        }
    }

    // Associated files, in attachment order.
    match af {
        Some((slot, mut items)) => {
            items.push(filespec_id.into());
            container.put_entry(catalog_id, b"AF", slot, items)?;
        }
        None => container.set_catalog_entry(b"AF", vec![Object::from(filespec_id)])?,
    }

    tracing::info!(%filespec_id, %file_id, "Embedded associated file");
    Ok(container)
}

fn embedded_file_stream(attachment: &Attachment) -> Result<Stream> {
    let modified = attachment.modified.unwrap_or_else(Utc::now);
    let mut dict = Dictionary::new()
        .with("Type", Object::name("EmbeddedFile"))
        .with(
            "Params",
            Dictionary::new()
                .with("Size", attachment.payload.len())
                .with("ModDate", Object::date(modified)),
        );
    if let Some(mime) = &attachment.mime_type {
        dict.set(b"Subtype", Object::name(mime));
    }
    Stream::flate(dict, &attachment.payload)
}

/// `/F` must be a plain byte string; non-ASCII characters become `_`.
fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

/// `/UF`, else `/F`, of a file specification.
fn filespec_name(container: &Container, filespec: &Object) -> Option<String> {
    let dict = container.resolve(filespec).as_dict()?;
    [&b"UF"[..], b"F"]
        .iter()
        .find_map(|key| dict.get(key).map(|v| container.resolve(v)))
        .and_then(Object::as_string_bytes)
        .map(decode_text_string)
}

fn read_filespec(container: &Container, filespec: &Object) -> Result<EmbeddedFile> {
    let dict = container
        .resolve(filespec)
        .as_dict()
        .ok_or_else(|| Error::malformed("file specification is not a dictionary"))?;
    let name = filespec_name(container, filespec).unwrap_or_default();
    let relationship = dict
        .get_name(b"AFRelationship")
        .and_then(Relationship::from_name)
        .unwrap_or(Relationship::Unspecified);

    let ef = dict
        .get(b"EF")
        .map(|e| container.resolve(e))
        .and_then(Object::as_dict)
        .ok_or_else(|| Error::malformed(format!("file specification '{name}' has no /EF")))?;
    let stream = [&b"F"[..], b"UF"]
        .iter()
        .find_map(|key| ef.get(key))
        .map(|s| container.resolve(s))
        .and_then(Object::as_stream)
        .ok_or_else(|| {
            Error::malformed(format!("file specification '{name}' has no embedded stream"))
        })?;
    let mime_type = stream
        .dict
        .get_name(b"Subtype")
        .map(|m| String::from_utf8_lossy(m).into_owned());

    Ok(EmbeddedFile {
        name,
        filespec: filespec.as_reference(),
        relationship,
        mime_type,
        data: stream.decoded()?,
    })
}

/// Look `name` up in the `/EmbeddedFiles` name tree.
pub fn find_embedded_file(container: &Container, name: &str) -> Result<Option<EmbeddedFile>> {
    let catalog = container.catalog()?;
    let Some((_, names)) = container.entry_dict(catalog, b"Names")? else {
        return Ok(None);
    };
    let Some((_, root)) = container.entry_dict(&names, b"EmbeddedFiles")? else {
        return Ok(None);
    };
    nametree::lookup(container, &root, name)?
        .map(|filespec| read_filespec(container, &filespec))
        .transpose()
}

/// Every file listed in the catalog `/AF` array, in order.
pub fn associated_files(container: &Container) -> Result<Vec<EmbeddedFile>> {
    let catalog = container.catalog()?;
    let Some((_, items)) = container.entry_array(catalog, b"AF")? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| read_filespec(container, item))
        .collect()
}
