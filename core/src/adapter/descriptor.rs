use crate::arch;
use crate::types::{Framework, ModelId};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Biomarker checkpoint name inside each biomarker directory
pub const BIOMARKER_FILE: &str = "mobilenetv3large_regressor_best.pth";

/// Where a model's artifact lives and how to read it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelArtifactDescriptor {
    pub id: ModelId,
    /// Checkpoint file, or the graph description for layer graphs
    pub path: PathBuf,
    pub framework: Framework,
    /// Channel count the network consumes
    pub input_channels: usize,
}

impl ModelArtifactDescriptor {
    /// Resolves the conventional artifact location under `models_dir`
    pub fn resolve(id: ModelId, models_dir: &Path) -> Self {
        Self {
            id,
            path: models_dir.join(relative_path(&id)),
            framework: id.family().framework(),
            input_channels: 3,
        }
    }

    /// Overrides the artifact path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// True when every file the artifact needs is present
    pub fn exists(&self) -> bool {
        match self.framework {
            Framework::Torch => {
                self.path.is_file() || self.path.with_extension("safetensors").is_file()
            }
            Framework::Keras => self.path.is_file() && arch::weights_path(&self.path).is_file(),
        }
    }
}

fn relative_path(id: &ModelId) -> PathBuf {
    match id {
        ModelId::AmdOct => PathBuf::from("best_f1.pt"),
        ModelId::AmdFundus => PathBuf::from("AMD_Fundus_Binary_calssifier_Model_resnet50.pth"),
        ModelId::Glaucoma => PathBuf::from("best.json"),
        ModelId::DrFundus => PathBuf::from("model_fold1_acc0.8734.pth"),
        ModelId::DrOct => PathBuf::from("my_model.json"),
        ModelId::Biomarker(_) => {
            let dir = id
                .biomarker_spec()
                .map(|spec| spec.directory_name())
                .unwrap_or_default();
            Path::new(&dir).join(BIOMARKER_FILE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_conventional_paths() {
        let root = Path::new("/models");
        assert_eq!(
            ModelArtifactDescriptor::resolve(ModelId::AmdOct, root).path,
            root.join("best_f1.pt")
        );
        let hba1c = ModelId::biomarker("HbA1C %").unwrap();
        assert_eq!(
            ModelArtifactDescriptor::resolve(hba1c, root).path,
            root.join("HbA1C_pct").join(BIOMARKER_FILE)
        );
        let glaucoma = ModelArtifactDescriptor::resolve(ModelId::Glaucoma, root);
        assert_eq!(glaucoma.framework, Framework::Keras);
    }

    #[test]
    fn test_exists_requires_weights_for_layer_graphs() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = ModelArtifactDescriptor::resolve(ModelId::DrOct, temp_dir.path());
        std::fs::write(&descriptor.path, "{}").unwrap();
        assert!(!descriptor.exists());
        std::fs::write(temp_dir.path().join("my_model.safetensors"), b"").unwrap();
        assert!(descriptor.exists());
    }
}
