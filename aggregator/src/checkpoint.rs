//! Append-only checkpoint history of a node scope.
//!
//! Every completed round is stored in its own safetensors file named after the round, with
//! the arrays of the parameter vector stored as `arr_0`, `arr_1`, ... Files are created with
//! `create_new`, an existing checkpoint is never overwritten.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use comms::Parameters;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{AggregationErr, Result};

const ARRAY_PREFIX: &str = "arr_";
const F32_SIZE: usize = size_of::<f32>();

/// The checkpoint directory of one node scope.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Opens (creating it if needed) the checkpoint directory `model_path/node_name`.
    ///
    /// # Arguments
    /// * `model_path` - The root directory for all checkpoints.
    /// * `node_name` - The node scope.
    ///
    /// # Returns
    /// A new `CheckpointStore` or an io error if the directory can't be created.
    pub fn open(model_path: &Path, node_name: &str) -> io::Result<Self> {
        let dir = model_path.join(node_name);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory holding this scope's checkpoints.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path the checkpoint of `round` is written to.
    pub fn path_for(&self, round: u64) -> PathBuf {
        self.dir.join(format!("round_{round}_model.safetensors"))
    }

    /// Persists the aggregate of `round`.
    ///
    /// # Arguments
    /// * `round` - The round number, encoded in the file name.
    /// * `params` - The aggregated parameter vector.
    ///
    /// # Returns
    /// The path of the new checkpoint, or a `Checkpoint` error if it already exists
    /// or can't be encoded.
    pub fn save(&self, round: u64, params: &[ArrayD<f32>]) -> Result<PathBuf> {
        let path = self.path_for(round);
        let fail = |detail: String| AggregationErr::Checkpoint {
            path: path.clone(),
            detail,
        };

        let encoded: Vec<(String, Vec<usize>, Vec<u8>)> = params
            .iter()
            .enumerate()
            .map(|(i, arr)| {
                let bytes = arr.iter().flat_map(|x| x.to_le_bytes()).collect();
                (format!("{ARRAY_PREFIX}{i}"), arr.shape().to_vec(), bytes)
            })
            .collect();

        let views = encoded
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes).map(|view| (name.as_str(), view))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| fail(format!("{e:?}")))?;

        let bytes = safetensors::serialize(views, &None).map_err(|e| fail(format!("{e:?}")))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(fail("refusing to overwrite an existing checkpoint".into()));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Loads a checkpoint back as a parameter vector.
    ///
    /// Arrays named `arr_N` are ordered by `N`, any other naming falls back to name order.
    ///
    /// # Arguments
    /// * `path` - The checkpoint file.
    ///
    /// # Returns
    /// `None` if the file doesn't exist, or a `Checkpoint` error if it can't be decoded.
    pub fn load(path: &Path) -> Result<Option<Parameters>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let fail = |detail: String| AggregationErr::Checkpoint {
            path: path.to_path_buf(),
            detail,
        };

        let tensors = SafeTensors::deserialize(&bytes).map_err(|e| fail(format!("{e:?}")))?;
        let mut named = tensors.tensors();

        let indices: Option<Vec<usize>> = named
            .iter()
            .map(|(name, _)| name.strip_prefix(ARRAY_PREFIX)?.parse().ok())
            .collect();

        match indices {
            Some(indices) => {
                let mut indexed: Vec<_> = indices.into_iter().zip(named).collect();
                indexed.sort_by_key(|(i, _)| *i);
                named = indexed.into_iter().map(|(_, tensor)| tensor).collect();
            }
            None => named.sort_by(|(a, _), (b, _)| a.cmp(b)),
        }

        named
            .into_iter()
            .map(|(name, view)| {
                if view.dtype() != Dtype::F32 {
                    return Err(fail(format!("{name} is {:?}, expected F32", view.dtype())));
                }

                let data = view
                    .data()
                    .chunks_exact(F32_SIZE)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();

                ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                    .map_err(|e| fail(format!("{name}: {e}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn saved_rounds_load_back_in_order() {
        let root = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(root.path(), "node-1").unwrap();

        let params: Parameters = (0..12)
            .map(|i| ArrayD::from_elem(IxDyn(&[2, 1]), i as f32))
            .chain([array![[1.5, 2.5, 3.5]].into_dyn()])
            .collect();

        let path = store.save(3, &params).unwrap();
        assert_eq!(path, root.path().join("node-1/round_3_model.safetensors"));

        let loaded = CheckpointStore::load(&path).unwrap().unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn existing_checkpoints_are_never_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(root.path(), "node-1").unwrap();

        let first = vec![array![1.0].into_dyn()];
        let second = vec![array![2.0].into_dyn()];

        let path = store.save(1, &first).unwrap();
        let err = store.save(1, &second).unwrap_err();
        assert!(matches!(err, AggregationErr::Checkpoint { .. }));

        let loaded = CheckpointStore::load(&path).unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("round_9_model.safetensors");
        assert!(CheckpointStore::load(&missing).unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_checkpoint_error() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("broken.safetensors");
        fs::write(&path, b"not a checkpoint").unwrap();

        let err = CheckpointStore::load(&path).unwrap_err();
        assert!(matches!(err, AggregationErr::Checkpoint { .. }));
    }
}
