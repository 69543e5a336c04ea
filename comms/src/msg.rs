use std::io;

use ndarray::{ArrayD, IxDyn};

use crate::{
    Deserialize, Serialize,
    params::{self, Parameters},
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

type MetaLen = u32;
const META_LEN_SIZE: usize = size_of::<MetaLen>();

const F32_SIZE: usize = size_of::<f32>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const FIT_H: Header = 2;
const EVALUATE_H: Header = 3;
const FIT_RES_H: Header = 4;
const PARAMS_H: Header = 5;

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Asks a client for its current parameters.
    GetParameters,
    /// A client's evaluation result.
    EvaluateRes { loss: f32, samples: u64 },
    /// A client that doesn't evaluate answers an `Evaluate` with this.
    NotApplicable,
    Disconnect,
}

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fit { round: u64, params: Parameters },
    Evaluate { round: u64, params: Parameters },
    FitRes { params: Parameters, samples: u64 },
    Params(Parameters),
}

/// The application layer message exchanged between tiers.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Control(Command),
    Data(Payload),
    Err(String),
}

/// The json header written in front of the raw floats of a `Data` message.
#[derive(serde::Serialize, serde::Deserialize)]
struct DataMeta {
    #[serde(default)]
    round: u64,
    #[serde(default)]
    samples: u64,
    shapes: Vec<Vec<usize>>,
}

impl Msg {
    fn invalid_data<T>(detail: impl Into<String>) -> io::Result<T> {
        Err(io::Error::new(io::ErrorKind::InvalidData, detail.into()))
    }

    /// Writes the meta header followed by every array's scalars in order.
    fn write_params(
        buf: &mut Vec<u8>,
        round: u64,
        samples: u64,
        params: &[ArrayD<f32>],
    ) -> io::Result<()> {
        let meta = DataMeta {
            round,
            samples,
            shapes: params::shapes(params),
        };

        let meta_start = buf.len();
        buf.extend_from_slice(&[0; META_LEN_SIZE]);
        serde_json::to_writer(&mut *buf, &meta)?;

        let meta_len = (buf.len() - meta_start - META_LEN_SIZE) as MetaLen;
        buf[meta_start..meta_start + META_LEN_SIZE].copy_from_slice(&meta_len.to_be_bytes());

        buf.reserve(params::num_elements(params) * F32_SIZE);
        for arr in params {
            match arr.as_slice() {
                Some(nums) => buf.extend_from_slice(bytemuck::cast_slice(nums)),
                None => arr
                    .iter()
                    .for_each(|x| buf.extend_from_slice(&x.to_ne_bytes())),
            }
        }

        Ok(())
    }

    /// Reads back what `write_params` wrote.
    fn read_params(buf: &[u8]) -> io::Result<(DataMeta, Parameters)> {
        if buf.len() < META_LEN_SIZE {
            return Self::invalid_data("data message is missing its meta header");
        }

        let (len_buf, rest) = buf.split_at(META_LEN_SIZE);
        let mut len_bytes = [0; META_LEN_SIZE];
        len_bytes.copy_from_slice(len_buf);
        let meta_len = MetaLen::from_be_bytes(len_bytes) as usize;

        if rest.len() < meta_len {
            return Self::invalid_data(format!(
                "meta header claims {meta_len} bytes but only {} remain",
                rest.len()
            ));
        }

        let (meta_buf, mut nums) = rest.split_at(meta_len);
        let meta: DataMeta = serde_json::from_slice(meta_buf)?;

        let mut lens = Vec::with_capacity(meta.shapes.len());
        let mut expected: usize = 0;
        for shape in &meta.shapes {
            let len = shape
                .iter()
                .try_fold(F32_SIZE, |acc, &dim| acc.checked_mul(dim))
                .and_then(|len| {
                    expected = expected.checked_add(len)?;
                    Some(len)
                });

            match len {
                Some(len) => lens.push(len),
                None => return Self::invalid_data(format!("shape {shape:?} is too large")),
            }
        }

        if nums.len() != expected {
            return Self::invalid_data(format!(
                "expected {expected} bytes of floats, got {}",
                nums.len()
            ));
        }

        let mut params = Vec::with_capacity(meta.shapes.len());
        for (shape, len) in meta.shapes.iter().zip(lens) {
            let (head, tail) = nums.split_at(len);

            let data = head
                .chunks_exact(F32_SIZE)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();

            let arr = ArrayD::from_shape_vec(IxDyn(shape), data)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            params.push(arr);
            nums = tail;
        }

        Ok((meta, params))
    }
}

impl Serialize for Msg {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                buf.extend_from_slice(e.as_bytes());
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());
                serde_json::to_writer(&mut *buf, cmd)?;
            }
            Msg::Data(payload) => {
                let (kind, round, samples, params) = match payload {
                    Payload::Fit { round, params } => (FIT_H, *round, 0, params),
                    Payload::Evaluate { round, params } => (EVALUATE_H, *round, 0, params),
                    Payload::FitRes { params, samples } => (FIT_RES_H, 0, *samples, params),
                    Payload::Params(params) => (PARAMS_H, 0, 0, params),
                };

                buf.extend_from_slice(&kind.to_be_bytes());
                Self::write_params(buf, round, samples, params)?;
            }
        }

        Ok(())
    }
}

impl Deserialize for Msg {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::invalid_data(format!(
                "The given buffer is too small {}, must at least be {HEADER_SIZE} bytes",
                buf.len()
            ));
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut kind_bytes = [0; HEADER_SIZE];
        kind_bytes.copy_from_slice(kind_buf);

        match Header::from_be_bytes(kind_bytes) {
            ERR_H => {
                let detail = std::str::from_utf8(rest)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

                Ok(Self::Err(detail.to_string()))
            }
            CONTROL_H => Ok(Self::Control(serde_json::from_slice(rest)?)),
            kind @ FIT_H..=PARAMS_H => {
                let (meta, params) = Self::read_params(rest)?;

                let payload = match kind {
                    FIT_H => Payload::Fit {
                        round: meta.round,
                        params,
                    },
                    EVALUATE_H => Payload::Evaluate {
                        round: meta.round,
                        params,
                    },
                    FIT_RES_H => Payload::FitRes {
                        params,
                        samples: meta.samples,
                    },
                    _ => Payload::Params(params),
                };

                Ok(Self::Data(payload))
            }
            kind => Self::invalid_data(format!("Received an invalid kind {kind}")),
        }
    }
}
