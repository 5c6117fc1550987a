//! Checkpoint reading and parameter loading
//!
//! A checkpoint on disk is reduced to a flat name → tensor map by trying an
//! ordered list of [`Strategy`] values. Each one either yields a non-empty
//! map or declines, and the first success wins. The map is then copied into
//! the variables of a freshly built network with [`load_into`].

mod metadata;

pub use metadata::{class_to_idx, read_metadata, read_pickle_metadata};

use crate::error::{Result, RetinaError};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Flat parameter map keyed by dotted parameter name
pub type TensorMap = HashMap<String, Tensor>;

/// Prefix added by data-parallel wrappers
const MODULE_PREFIX: &str = "module.";

/// Buffers that carry no inference state
const IGNORED_SUFFIX: &str = "num_batches_tracked";

/// One way of locating the tensor map inside a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Parameters nested under a top-level key
    Wrapped(&'static str),
    /// The checkpoint itself is the parameter map
    Bare,
}

impl Strategy {
    /// Extraction order
    pub const ORDER: [Strategy; 5] = [
        Strategy::Wrapped("model_state"),
        Strategy::Wrapped("state_dict"),
        Strategy::Wrapped("weights"),
        Strategy::Wrapped("model"),
        Strategy::Bare,
    ];

    fn extract_pickle(&self, path: &Path) -> Option<TensorMap> {
        let key = match self {
            Strategy::Wrapped(key) => Some(*key),
            Strategy::Bare => None,
        };
        match candle_core::pickle::read_all_with_key(path, key) {
            Ok(pairs) if !pairs.is_empty() => Some(pairs.into_iter().collect()),
            Ok(_) => None,
            Err(e) => {
                debug!("{} declined {}: {}", self, path.display(), e);
                None
            }
        }
    }

    fn extract_safetensors(&self, tensors: &TensorMap) -> Option<TensorMap> {
        let map: TensorMap = match self {
            Strategy::Wrapped(key) => {
                let prefix = format!("{}.", key);
                tensors
                    .iter()
                    .filter_map(|(name, t)| {
                        name.strip_prefix(&prefix)
                            .map(|rest| (rest.to_string(), t.clone()))
                    })
                    .collect()
            }
            Strategy::Bare => tensors.clone(),
        };
        (!map.is_empty()).then_some(map)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Wrapped(key) => write!(f, "wrapped[{}]", key),
            Strategy::Bare => write!(f, "bare"),
        }
    }
}

/// On-disk encoding of a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    Pickle,
    SafeTensors,
}

/// Parameter map extracted from a checkpoint file
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    format: CheckpointFormat,
    strategy: Strategy,
    tensors: TensorMap,
    metadata: HashMap<String, String>,
}

impl Checkpoint {
    /// Opens a checkpoint, preferring a `.safetensors` sibling of `path`
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::ArtifactError`] when the file is missing or no
    /// strategy yields a tensor map (for example a fully serialized module).
    pub fn open(path: &Path, device: &Device) -> Result<Self> {
        let path = resolve(path);
        if !path.is_file() {
            return Err(RetinaError::ArtifactError(format!(
                "checkpoint not found: {}",
                path.display()
            )));
        }

        let format = if is_safetensors(&path) {
            CheckpointFormat::SafeTensors
        } else {
            CheckpointFormat::Pickle
        };

        let (strategy, tensors, metadata) = match format {
            CheckpointFormat::SafeTensors => {
                let all = candle_core::safetensors::load(&path, &Device::Cpu)?;
                let metadata = read_metadata(&path)?;
                let (strategy, tensors) = Strategy::ORDER
                    .iter()
                    .find_map(|s| s.extract_safetensors(&all).map(|m| (*s, m)))
                    .ok_or_else(|| no_tensor_map(&path))?;
                (strategy, tensors, metadata)
            }
            CheckpointFormat::Pickle => {
                let (strategy, tensors) = Strategy::ORDER
                    .iter()
                    .find_map(|s| s.extract_pickle(&path).map(|m| (*s, m)))
                    .ok_or_else(|| no_tensor_map(&path))?;
                let metadata = read_pickle_metadata(&path).unwrap_or_else(|e| {
                    debug!("No metadata read from {}: {}", path.display(), e);
                    HashMap::new()
                });
                (strategy, tensors, metadata)
            }
        };
        debug!(
            "Extracted {} tensors from {} using {}",
            tensors.len(),
            path.display(),
            strategy
        );

        let tensors = strip_module_prefix(tensors)
            .into_iter()
            .map(|(name, t)| Ok((name, t.to_device(device)?)))
            .collect::<Result<TensorMap>>()?;

        Ok(Self {
            path,
            format,
            strategy,
            tensors,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> CheckpointFormat {
        self.format
    }

    /// Strategy that produced the tensor map
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn tensors(&self) -> &TensorMap {
        &self.tensors
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Class-name → index mapping stored alongside the weights, if any
    pub fn class_to_idx(&self) -> Option<BTreeMap<String, usize>> {
        class_to_idx(&self.metadata)
    }

    /// Number of outputs of the classification head
    ///
    /// Taken from the leading dimension of `head_weight` when present,
    /// otherwise from the class mapping (two classes use a single logit),
    /// otherwise one.
    pub fn head_width(&self, head_weight: &str) -> usize {
        if let Some(weight) = self.get(head_weight) {
            if let Some(&rows) = weight.dims().first() {
                return rows;
            }
        }
        match self.class_to_idx().map(|m| m.len()) {
            Some(2) => 1,
            Some(n) if n > 0 => n,
            _ => 1,
        }
    }
}

/// Returns the `.safetensors` sibling of `path` when it exists
pub fn resolve(path: &Path) -> PathBuf {
    if is_safetensors(path) {
        return path.to_path_buf();
    }
    let sibling = path.with_extension("safetensors");
    if sibling.is_file() {
        sibling
    } else {
        path.to_path_buf()
    }
}

fn is_safetensors(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("safetensors")
}

fn no_tensor_map(path: &Path) -> RetinaError {
    RetinaError::ArtifactError(format!(
        "no parameter map found in {} (full serialized modules are not supported)",
        path.display()
    ))
}

/// Drops a leading `module.` from names that carry it
pub fn strip_module_prefix(tensors: TensorMap) -> TensorMap {
    tensors
        .into_iter()
        .map(|(name, t)| match name.strip_prefix(MODULE_PREFIX) {
            Some(stripped) => (stripped.to_string(), t),
            None => (name, t),
        })
        .collect()
}

/// How strictly checkpoint names must match the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Any difference is an error
    Strict,
    /// Try strict first, then copy every name whose shape matches
    StrictThenRelaxed,
}

/// Outcome of copying a checkpoint into a network's variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Network parameters absent from the checkpoint
    pub missing: Vec<String>,
    /// Checkpoint tensors the network does not have
    pub unexpected: Vec<String>,
    /// Names present on both sides with differing shapes
    pub mismatched: Vec<String>,
    /// Number of parameters copied
    pub loaded: usize,
}

impl LoadReport {
    /// True when every name and shape matched
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} missing, {} unexpected, {} shape mismatches",
            self.loaded,
            self.missing.len(),
            self.unexpected.len(),
            self.mismatched.len()
        )
    }
}

/// Copies checkpoint tensors into the variables of `varmap`
///
/// # Errors
///
/// Under [`LoadPolicy::Strict`] any missing, unexpected or mismatched name
/// is an [`RetinaError::ArtifactError`]; nothing is copied in that case.
pub fn load_into(varmap: &VarMap, tensors: &TensorMap, policy: LoadPolicy) -> Result<LoadReport> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| RetinaError::ArtifactError("variable map lock poisoned".to_string()))?;

    let mut report = LoadReport::default();
    for (name, var) in data.iter() {
        match tensors.get(name) {
            None => report.missing.push(name.clone()),
            Some(t) if t.dims() != var.dims() => report.mismatched.push(name.clone()),
            Some(_) => {}
        }
    }
    report.unexpected = tensors
        .keys()
        .filter(|name| !name.ends_with(IGNORED_SUFFIX) && !data.contains_key(*name))
        .cloned()
        .collect();
    report.missing.sort();
    report.unexpected.sort();
    report.mismatched.sort();

    if !report.is_exact() {
        warn!("Strict load failed: {}", report);
        if !report.missing.is_empty() {
            warn!("Missing from checkpoint: {}", report.missing.join(", "));
        }
        if !report.unexpected.is_empty() {
            warn!("Unexpected in checkpoint: {}", report.unexpected.join(", "));
        }
        if !report.mismatched.is_empty() {
            warn!("Shape mismatch: {}", report.mismatched.join(", "));
        }
        if policy == LoadPolicy::Strict {
            return Err(RetinaError::ArtifactError(format!(
                "checkpoint does not match network: {}",
                report
            )));
        }
        warn!("Retrying with relaxed matching");
    }

    for (name, var) in data.iter() {
        if let Some(t) = tensors.get(name) {
            if t.dims() == var.dims() {
                var.set(&t.to_dtype(DType::F32)?.to_device(var.device())?)?;
                report.loaded += 1;
            }
        }
    }
    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::test_support::{write_safetensors, write_torch_zip};
    use super::*;
    use candle_nn::{linear, VarBuilder};
    use tempfile::TempDir;

    fn linear_varmap(inputs: usize, outputs: usize) -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        linear(inputs, outputs, vb.pp("fc")).unwrap();
        varmap
    }

    fn tensor_map(entries: &[(&str, &[usize])]) -> TensorMap {
        entries
            .iter()
            .map(|(name, shape)| {
                (name.to_string(), Tensor::ones(*shape, DType::F32, &Device::Cpu).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_strategies_prefer_wrapped_dicts() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("best_f1.safetensors");
        write_safetensors(
            &path,
            &[
                ("model_state.fc.weight", vec![2, 3], vec![0.5; 6]),
                ("model_state.fc.bias", vec![2], vec![0.1; 2]),
                ("epoch", vec![1], vec![3.0]),
            ],
            &[],
        );
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        assert_eq!(ckpt.strategy(), Strategy::Wrapped("model_state"));
        assert_eq!(ckpt.tensors().len(), 2);
        assert_eq!(ckpt.get("fc.weight").unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_bare_map_with_module_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bare.safetensors");
        write_safetensors(
            &path,
            &[
                ("module.fc.weight", vec![1, 2], vec![1.0, 2.0]),
                ("fc.bias", vec![1], vec![0.0]),
            ],
            &[],
        );
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        assert_eq!(ckpt.strategy(), Strategy::Bare);
        assert!(ckpt.get("fc.weight").is_some());
        assert!(ckpt.get("fc.bias").is_some());
    }

    #[test]
    fn test_safetensors_sibling_preferred() {
        let temp_dir = TempDir::new().unwrap();
        let pth = temp_dir.path().join("model.pth");
        std::fs::write(&pth, b"not a pickle").unwrap();
        assert_eq!(resolve(&pth), pth);

        let sibling = temp_dir.path().join("model.safetensors");
        write_safetensors(&sibling, &[("w", vec![1], vec![1.0])], &[]);
        assert_eq!(resolve(&pth), sibling);
        assert_eq!(
            Checkpoint::open(&pth, &Device::Cpu).unwrap().format(),
            CheckpointFormat::SafeTensors
        );
    }

    #[test]
    fn test_pickle_class_mapping_sets_head_width() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("best_model.pth");
        write_torch_zip(
            &path,
            Some("state_dict"),
            &[("conv1.weight", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0])],
            &[("a", 0), ("b", 1), ("c", 2)],
        );
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        assert_eq!(ckpt.format(), CheckpointFormat::Pickle);
        assert_eq!(ckpt.strategy(), Strategy::Wrapped("state_dict"));
        assert_eq!(ckpt.class_to_idx().unwrap()["c"], 2);
        assert_eq!(ckpt.head_width("fc.weight"), 3);
    }

    #[test]
    fn test_bare_pickle_without_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bare.pth");
        write_torch_zip(&path, None, &[("fc.weight", vec![4, 2], vec![0.5; 8])], &[]);
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        assert_eq!(ckpt.strategy(), Strategy::Bare);
        assert!(ckpt.class_to_idx().is_none());
        assert_eq!(ckpt.head_width("fc.weight"), 4);
    }

    #[test]
    fn test_missing_and_unreadable_checkpoints() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.pth");
        assert!(matches!(
            Checkpoint::open(&missing, &Device::Cpu),
            Err(RetinaError::ArtifactError(_))
        ));

        let garbage = temp_dir.path().join("garbage.pth");
        std::fs::write(&garbage, b"\x80\x02}q\x00.").unwrap();
        assert!(Checkpoint::open(&garbage, &Device::Cpu).is_err());
    }

    #[test]
    fn test_head_width_from_weight_then_classes() {
        let temp_dir = TempDir::new().unwrap();
        let with_fc = temp_dir.path().join("fc.safetensors");
        write_safetensors(&with_fc, &[("fc.weight", vec![3, 4], vec![0.0; 12])], &[]);
        assert_eq!(Checkpoint::open(&with_fc, &Device::Cpu).unwrap().head_width("fc.weight"), 3);

        let two_classes = temp_dir.path().join("two.safetensors");
        write_safetensors(
            &two_classes,
            &[("conv.weight", vec![1], vec![0.0])],
            &[("class_to_idx", r#"{"No AMD": 0, "AMD Present": 1}"#)],
        );
        let ckpt = Checkpoint::open(&two_classes, &Device::Cpu).unwrap();
        assert_eq!(ckpt.class_to_idx().unwrap()["AMD Present"], 1);
        assert_eq!(ckpt.head_width("fc.weight"), 1);

        let none = temp_dir.path().join("none.safetensors");
        write_safetensors(&none, &[("conv.weight", vec![1], vec![0.0])], &[]);
        assert_eq!(Checkpoint::open(&none, &Device::Cpu).unwrap().head_width("fc.weight"), 1);
    }

    #[test]
    fn test_strict_load_exact_match() {
        let varmap = linear_varmap(3, 2);
        let tensors = tensor_map(&[
            ("fc.weight", &[2, 3]),
            ("fc.bias", &[2]),
            ("bn.num_batches_tracked", &[1]),
        ]);
        let report = load_into(&varmap, &tensors, LoadPolicy::Strict).unwrap();
        assert!(report.is_exact());
        assert_eq!(report.loaded, 2);
        let data = varmap.data().lock().unwrap();
        let weight: Vec<f32> = data["fc.weight"].as_tensor().flatten_all().unwrap().to_vec1().unwrap();
        assert!(weight.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_strict_load_rejects_mismatch() {
        let varmap = linear_varmap(3, 2);
        let tensors = tensor_map(&[("fc.weight", &[1, 3]), ("fc.bias", &[2])]);
        assert!(load_into(&varmap, &tensors, LoadPolicy::Strict).is_err());
    }

    #[test]
    fn test_relaxed_load_copies_matching_names() {
        let varmap = linear_varmap(3, 2);
        let tensors = tensor_map(&[
            ("fc.weight", &[1, 3]),
            ("fc.bias", &[2]),
            ("aux.weight", &[4]),
        ]);
        let report = load_into(&varmap, &tensors, LoadPolicy::StrictThenRelaxed).unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.mismatched, vec!["fc.weight".to_string()]);
        assert_eq!(report.unexpected, vec!["aux.weight".to_string()]);
        assert!(report.missing.is_empty());
    }
}
