//! Run manifests: which frames to align and how each registers to its predecessor.
//!
//! A manifest is JSON, or YAML when the file name ends in `.yml`/`.yaml`.
//! Indices are 1-based in acquisition order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::AlignError;
use crate::transform::{AffineTransform, TransformSpec};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default)]
    pub frames: Vec<FrameEntry>,
    /// Extra non-propagating frames, merged with the per-frame flags.
    #[serde(default)]
    pub non_propagating: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEntry {
    pub name: String,
    /// Registers this frame to the previous one; identity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSpec>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub non_propagating: bool,
}

/// Frame names with their pairwise transforms, ready for the pipeline.
#[derive(Debug, Clone)]
pub struct FrameStack {
    pub names: Vec<String>,
    pub pairwise: Vec<AffineTransform>,
    pub non_propagating: BTreeSet<usize>,
}

impl FrameStack {
    pub fn len(&self) -> usize {
        self.names.len()
    }
}

impl RunManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;

        let manifest = if is_yaml(path) {
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing YAML manifest {}", path.display()))?
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON manifest {}", path.display()))?
        };
        log::info!("Manifest loaded from: {}", path.display());
        Ok(manifest)
    }

    /// Resolve into a [`FrameStack`], merging `extra_non_propagating` (from
    /// the command line) with the manifest's own flags.
    ///
    /// When the manifest lists no frames, every image in `input_dir` is
    /// used in name order with identity transforms.
    pub fn into_stack(
        self,
        input_dir: &Path,
        extra_non_propagating: &[usize],
    ) -> Result<FrameStack, AlignError> {
        let entries = if self.frames.is_empty() {
            let discovered =
                discover_frames(input_dir).map_err(|source| AlignError::ReadInputDir {
                    path: input_dir.to_path_buf(),
                    source,
                })?;
            log::info!(
                "Manifest lists no frames, using {} images found in {}",
                discovered.len(),
                input_dir.display()
            );
            discovered
                .into_iter()
                .map(|name| FrameEntry {
                    name,
                    transform: None,
                    non_propagating: false,
                })
                .collect()
        } else {
            self.frames
        };

        if entries.is_empty() {
            return Err(AlignError::NoFrames);
        }
        let frames = entries.len();
        for entry in &entries {
            check_frame_name(&entry.name)?;
        }

        let mut non_propagating: BTreeSet<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.non_propagating)
            .map(|(i, _)| i + 1)
            .collect();
        for &index in self.non_propagating.iter().chain(extra_non_propagating) {
            if index == 0 || index > frames {
                return Err(AlignError::FrameIndexOutOfRange { index, frames });
            }
            non_propagating.insert(index);
        }

        let (names, pairwise) = entries
            .into_iter()
            .map(|e| (e.name, e.transform.map(AffineTransform::from).unwrap_or_default()))
            .unzip();

        Ok(FrameStack {
            names,
            pairwise,
            non_propagating,
        })
    }
}

/// Frame names must be a single file name so the destination stays inside
/// the output directory.
pub fn check_frame_name(name: &str) -> Result<(), AlignError> {
    let path = Path::new(name);
    let plain = path.components().count() == 1
        && path.file_name().map(|n| n == path.as_os_str()).unwrap_or(false);
    if plain {
        Ok(())
    } else {
        Err(AlignError::InvalidFrameName {
            name: name.to_string(),
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "yml" | "yaml"))
        .unwrap_or(false)
}

/// Image file names in `dir`, sorted.
pub fn discover_frames(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

/// Default manifest location inside an input directory.
pub fn default_manifest_path(input_dir: &Path) -> PathBuf {
    input_dir.join("transforms.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "frames": [
            { "name": "0001.png" },
            { "name": "0002.png", "transform": [1.0, 0.0, 3.5, -2.0] },
            { "name": "0003.png", "transform": [[1, 0, 4], [0, 1, 0]], "non_propagating": true },
            { "name": "0004.png" }
        ],
        "non_propagating": [4]
    }"#;

    #[test]
    fn parses_both_transform_forms() {
        let manifest: RunManifest = serde_json::from_str(JSON).unwrap();
        let stack = manifest.into_stack(Path::new("."), &[]).unwrap();

        assert_eq!(stack.len(), 4);
        assert!(stack.pairwise[0].is_identity());
        assert_eq!(stack.pairwise[1].to_params()[2], 3.5);
        assert_eq!(stack.pairwise[2].to_rows()[0][2], 4.0);
        assert!(stack.pairwise[3].is_identity());
        assert_eq!(stack.non_propagating, BTreeSet::from([3, 4]));
    }

    #[test]
    fn command_line_indices_are_merged_and_checked() {
        let manifest: RunManifest = serde_json::from_str(JSON).unwrap();
        let stack = manifest.clone().into_stack(Path::new("."), &[1]).unwrap();
        assert_eq!(stack.non_propagating, BTreeSet::from([1, 3, 4]));

        let err = manifest.into_stack(Path::new("."), &[9]).unwrap_err();
        assert!(matches!(
            err,
            AlignError::FrameIndexOutOfRange { index: 9, frames: 4 }
        ));
    }

    #[test]
    fn empty_manifest_discovers_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.tif", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let stack = RunManifest::default().into_stack(dir.path(), &[]).unwrap();
        assert_eq!(stack.names, vec!["a.tif", "b.png"]);
        assert!(stack.pairwise.iter().all(|t| t.is_identity()));
    }

    #[test]
    fn frame_names_must_stay_in_their_directory() {
        for name in ["../raw/0001.png", "sub/0001.png", "/abs/0001.png", "..", "."] {
            let manifest: RunManifest =
                serde_json::from_str(&format!(r#"{{"frames":[{{"name":{:?}}}]}}"#, name))
                    .unwrap();
            let err = manifest.into_stack(Path::new("."), &[]).unwrap_err();
            assert!(
                matches!(err, AlignError::InvalidFrameName { .. }),
                "{name} was accepted"
            );
        }
        assert!(check_frame_name("0001.png").is_ok());
    }

    #[test]
    fn missing_input_directory_keeps_io_cause() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = RunManifest::default().into_stack(&missing, &[]).unwrap_err();
        match err {
            AlignError::ReadInputDir { path, source } => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn yaml_manifest_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yml");
        std::fs::write(
            &path,
            "frames:\n  - name: 0001.png\n  - name: 0002.png\n    transform: [1.0, 0.0, 2.0, 0.0]\n    non_propagating: true\nnon_propagating: [1]\n",
        )
        .unwrap();

        let loaded = RunManifest::load(&path).unwrap();
        assert_eq!(loaded.frames.len(), 2);
        assert!(loaded.frames[1].non_propagating);
        assert_eq!(loaded.non_propagating, vec![1]);
        assert_eq!(
            loaded.frames[1].transform,
            Some(TransformSpec::Params([1.0, 0.0, 2.0, 0.0]))
        );
    }
}
