//! hestat ― depth-bounded aggregate statistics over encrypted vectors
//!
//! Sum, inner product, mean and population variance under a leveled
//! homomorphic scheme with a multiplicative depth budget of 2, for both
//! slot and coefficient packing.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

pub mod error;
pub mod modular;
pub mod ntt;
pub mod polynomial;
pub mod params;
pub mod scaling;
pub mod backend;
pub mod cipher;
pub mod clear;
pub mod encoder;
pub mod circuit;
pub mod aggregate;
pub mod stats;
pub mod decoder;
pub mod pipeline;
pub mod input;
pub mod report;
pub mod datagen;

pub use aggregate::{Aggregate, AggregateOutput, AggregationCircuit, CircuitPlan};
pub use backend::{ArithmeticBackend, PackingScheme, Plaintext};
pub use cipher::Cipher;
pub use circuit::{Circuit, NodeId, RotationPlan};
pub use clear::{BackendContext, ClearBackend};
pub use decoder::{Decoded, ResultDecoder};
pub use encoder::{EncodedVector, EncryptedVector, VectorEncoder};
pub use error::{Result, StatsError};
pub use params::SchemeParams;
pub use pipeline::{Operands, Outcome, Pipeline, PipelineConfig};
pub use polynomial::Polynomial;
pub use scaling::ScalingContext;
pub use stats::{Statistic, StatisticPlan, StatisticsComposer, VarianceMethod};
