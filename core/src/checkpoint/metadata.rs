use crate::error::{Result, RetinaError};
use candle_core::pickle::{Object, Stack};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Upper bound on a safetensors header
const MAX_HEADER_BYTES: u64 = 100 * 1024 * 1024;

/// Reads the string map stored under `__metadata__` in a safetensors header
///
/// Files without metadata yield an empty map.
pub fn read_metadata(path: &Path) -> Result<HashMap<String, String>> {
    let mut file = File::open(path)?;
    let mut len = [0u8; 8];
    file.read_exact(&mut len)?;
    let len = u64::from_le_bytes(len);
    if len > MAX_HEADER_BYTES {
        return Err(RetinaError::ArtifactError(format!(
            "safetensors header of {} bytes in {}",
            len,
            path.display()
        )));
    }
    let mut header = vec![0u8; len as usize];
    file.read_exact(&mut header)?;

    let header: serde_json::Value = serde_json::from_slice(&header)?;
    let metadata = header
        .get("__metadata__")
        .and_then(|m| m.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(metadata)
}

/// Reads the top-level entries of a torch zip checkpoint that carry metadata
///
/// Only a `class_to_idx` dict of string keys and non-negative integer
/// values is kept. It is stored as a JSON object string so both checkpoint
/// formats share [`class_to_idx`].
pub fn read_pickle_metadata(path: &Path) -> Result<HashMap<String, String>> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;
    let name = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_string)
        .ok_or_else(|| {
            RetinaError::ArtifactError(format!("no data.pkl in {}", path.display()))
        })?;
    let mut reader = BufReader::new(archive.by_name(&name)?);
    let mut stack = Stack::empty();
    stack.read_loop(&mut reader)?;
    pickle_metadata(stack.finalize()?)
}

fn pickle_metadata(root: Object) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    let Object::Dict(entries) = root else {
        return Ok(metadata);
    };
    let classes = entries.into_iter().find_map(|(key, value)| match (key, value) {
        (Object::Unicode(key), Object::Dict(classes)) if key == "class_to_idx" => Some(classes),
        _ => None,
    });
    if let Some(classes) = classes {
        let classes: BTreeMap<String, usize> = classes
            .into_iter()
            .filter_map(|(name, idx)| match (name, idx) {
                (Object::Unicode(name), Object::Int(idx)) if idx >= 0 => Some((name, idx as usize)),
                _ => None,
            })
            .collect();
        if !classes.is_empty() {
            metadata.insert("class_to_idx".to_string(), serde_json::to_string(&classes)?);
        }
    }
    Ok(metadata)
}

/// Parses the JSON class mapping stored under `class_to_idx`
pub fn class_to_idx(metadata: &HashMap<String, String>) -> Option<BTreeMap<String, usize>> {
    let raw = metadata.get("class_to_idx")?;
    serde_json::from_str(raw).ok()
}
