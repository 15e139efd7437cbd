//! Name trees (`/Names` leaves, `/Kids` intermediates, `/Limits` ranges).

use crate::container::Container;
use crate::object::{Dictionary, Object, ObjectId, decode_text_string};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashSet;

const MAX_DEPTH: usize = 32;

/// Every `(key, value)` pair in the tree, in tree order.
pub fn entries(container: &Container, root: &Dictionary) -> Result<Vec<(Vec<u8>, Object)>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    collect(container, root, 0, &mut seen, &mut out)?;
    Ok(out)
}

fn collect(
    container: &Container,
    node: &Dictionary,
    depth: usize,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<(Vec<u8>, Object)>,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::malformed("name tree nested too deeply"));
    }
    if let Some(names) = node.get(b"Names").map(|n| container.resolve(n)) {
        let names = names
            .as_array()
            .ok_or_else(|| Error::malformed("name tree /Names must be an array"))?;
        for pair in names.chunks_exact(2) {
            if let Some(key) = container.resolve(&pair[0]).as_string_bytes() {
                out.push((key.to_vec(), pair[1].clone()));
            }
        }
    }
    if let Some(kids) = node.get(b"Kids").map(|k| container.resolve(k)) {
        let kids = kids
            .as_array()
            .ok_or_else(|| Error::malformed("name tree /Kids must be an array"))?;
        for kid in kids {
            let id = kid
                .as_reference()
                .ok_or_else(|| Error::malformed("name tree kids must be references"))?;
            if !seen.insert(id) {
                return Err(Error::malformed(format!("name tree loops through {id}")));
            }
            let child = container
                .get(id)
                .and_then(Object::as_dict)
                .ok_or_else(|| Error::malformed(format!("name tree kid {id} is not a dictionary")))?
                .clone();
            collect(container, &child, depth + 1, seen, out)?;
        }
    }
    Ok(())
}

/// Value stored under `name`, comparing keys as decoded text.
pub fn lookup(container: &Container, root: &Dictionary, name: &str) -> Result<Option<Object>> {
    Ok(entries(container, root)?
        .into_iter()
        .find(|(key, _)| decode_text_string(key) == name)
        .map(|(_, value)| value))
}

/// Insert `key → value`, keeping keys sorted, and return the updated root.
///
/// Intermediate nodes are rewritten in place through the container; only
/// the returned root still has to be stored by the caller.
pub fn insert(
    container: &mut Container,
    root: Dictionary,
    key: &[u8],
    value: Object,
) -> Result<Dictionary> {
    insert_node(container, root, key, value, 0, true)
}

fn insert_node(
    container: &mut Container,
    mut node: Dictionary,
    key: &[u8],
    value: Object,
    depth: usize,
    is_root: bool,
) -> Result<Dictionary> {
    if depth > MAX_DEPTH {
        return Err(Error::malformed("name tree nested too deeply"));
    }

    let kids = match node.get(b"Kids").map(|k| container.resolve(k)) {
        Some(Object::Array(kids)) if !kids.is_empty() => Some(kids.clone()),
        Some(Object::Array(_)) | None => None,
        Some(other) => {
            return Err(Error::malformed(format!(
                "name tree /Kids must be an array, found {}",
                other.type_name()
            )));
        }
    };

    match kids {
        Some(kids) => {
            let kid_ids: Vec<ObjectId> = kids
                .iter()
                .map(|k| {
                    k.as_reference()
                        .ok_or_else(|| Error::malformed("name tree kids must be references"))
                })
                .collect::<Result<_>>()?;
            let target = covering_kid(container, &kid_ids, key);
            let child = container
                .get(target)
                .and_then(Object::as_dict)
                .ok_or_else(|| {
                    Error::malformed(format!("name tree kid {target} is not a dictionary"))
                })?
                .clone();
            let child = insert_node(container, child, key, value, depth + 1, false)?;
            container.update_object(target, child)?;
        }
        None => {
            let mut names = match node.get(b"Names").map(|n| container.resolve(n)) {
                Some(Object::Array(items)) => items.clone(),
                None | Some(Object::Null) => Vec::new(),
                Some(other) => {
                    return Err(Error::malformed(format!(
                        "name tree /Names must be an array, found {}",
                        other.type_name()
                    )));
                }
            };
            let mut at = names.len();
            for (i, pair) in names.chunks_exact(2).enumerate() {
                let existing = container.resolve(&pair[0]).as_string_bytes().unwrap_or_default();
                match existing.cmp(key) {
                    Ordering::Less => {}
                    Ordering::Equal => {
                        return Err(Error::DuplicateAssociation(decode_text_string(key)));
                    }
                    Ordering::Greater => {
                        at = i * 2;
                        break;
                    }
                }
            }
            names.insert(at, value);
            names.insert(at, Object::string(key));
            node.set(b"Names", names);
        }
    }

    if !is_root {
        widen_limits(container, &mut node, key);
    }
    Ok(node)
}

/// First kid whose upper limit is not below `key`, else the last kid.
fn covering_kid(container: &Container, kids: &[ObjectId], key: &[u8]) -> ObjectId {
    for &kid in kids {
        let upper = container
            .get(kid)
            .and_then(Object::as_dict)
            .and_then(|d| limits(container, d))
            .map(|(_, hi)| hi);
        if upper.is_some_and(|hi| key <= hi.as_slice()) {
            return kid;
        }
    }
    // Callers guarantee kids is non-empty.
    kids[kids.len() - 1]
}

fn limits(container: &Container, node: &Dictionary) -> Option<(Vec<u8>, Vec<u8>)> {
    let items = container.resolve(node.get(b"Limits")?).as_array()?;
    match items.as_slice() {
        [lo, hi] => Some((
            container.resolve(lo).as_string_bytes()?.to_vec(),
            container.resolve(hi).as_string_bytes()?.to_vec(),
        )),
        _ => None,
    }
}

fn widen_limits(container: &Container, node: &mut Dictionary, key: &[u8]) {
    let (lo, hi) = match limits(container, node) {
        Some((lo, hi)) => (lo.min(key.to_vec()), hi.max(key.to_vec())),
        None => (key.to_vec(), key.to_vec()),
    };
    node.set(b"Limits", vec![Object::string(lo), Object::string(hi)]);
}
