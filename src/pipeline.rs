//! One parametrized pipeline for every statistic and packing scheme:
//! plan, key generation, encoding, encryption, evaluation, decryption,
//! decoding.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{ArithmeticBackend, PackingScheme};
use crate::clear::BackendContext;
use crate::decoder::{Decoded, ResultDecoder};
use crate::encoder::VectorEncoder;
use crate::error::{Result, StatsError};
use crate::input::Batch;
use crate::params::SchemeParams;
use crate::report::{Stage, StageTimer, TimingReport};
use crate::scaling::ScalingContext;
use crate::stats::{Statistic, StatisticPlan, StatisticsComposer, VarianceMethod};

/// Everything that selects a pipeline variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ring dimension, plaintext modulus, depth budget.
    #[serde(default)]
    pub params: SchemeParams,
    /// Slot or coefficient packing.
    pub scheme: PackingScheme,
    /// What to compute.
    pub statistic: Statistic,
    /// Only read for [`Statistic::Variance`].
    #[serde(default)]
    pub variance_method: VarianceMethod,
    /// Alpha-scaling of coefficient encodings.
    #[serde(default)]
    pub scaling: Option<ScalingContext>,
}

impl PipelineConfig {
    /// Default parameters, no scaling, sum-of-squares variance.
    pub fn new(statistic: Statistic, scheme: PackingScheme) -> Self {
        Self {
            params: SchemeParams::default(),
            scheme,
            statistic,
            variance_method: VarianceMethod::default(),
            scaling: None,
        }
    }

    /// Replace the scheme parameters.
    pub fn with_params(mut self, params: SchemeParams) -> Self {
        self.params = params;
        self
    }

    /// Enable alpha-scaling.
    pub fn with_scaling(mut self, scaling: ScalingContext) -> Self {
        self.scaling = Some(scaling);
        self
    }

    /// Choose how variance is computed.
    pub fn with_variance_method(mut self, method: VarianceMethod) -> Self {
        self.variance_method = method;
        self
    }

    /// Reject inconsistent combinations before any key is generated.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if let Some(scaling) = &self.scaling {
            if self.scheme != PackingScheme::Coefficient {
                return Err(StatsError::InvalidParams(
                    "alpha-scaling applies to coefficient packing only".into(),
                ));
            }
            if scaling.modulus() != self.params.plaintext_modulus {
                return Err(StatsError::InvalidParams(format!(
                    "scaling modulus {} differs from plaintext modulus {}",
                    scaling.modulus(),
                    self.params.plaintext_modulus
                )));
            }
        }
        Ok(())
    }

    /// Row label for timing reports, e.g. `variance-coefficient-scaled`.
    pub fn label(&self) -> String {
        let statistic = match self.statistic {
            Statistic::Sum => "sum",
            Statistic::InnerProduct => "inner-product",
            Statistic::Mean => "mean",
            Statistic::Variance => match self.variance_method {
                VarianceMethod::SumOfSquares => "variance",
                VarianceMethod::Deviation => "variance-deviation",
            },
        };
        let scheme = match self.scheme {
            PackingScheme::Slot => "slot",
            PackingScheme::Coefficient => "coefficient",
        };
        let suffix = if self.scaling.is_some() { "-scaled" } else { "" };
        format!("{statistic}-{scheme}{suffix}")
    }

    /// Rotation keys a run over `n` elements needs.
    pub fn rotation_offsets(&self, n: usize) -> Result<Vec<usize>> {
        Ok(self.composer().plan(self.statistic, self.scheme, n, self.variance_method)?.rotation_offsets())
    }

    fn composer(&self) -> StatisticsComposer {
        StatisticsComposer::new(&self.params).with_scaling(self.scaling)
    }
}

/// Cleartext operands of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    /// Sum, mean and variance.
    Single(Vec<i64>),
    /// Inner product.
    Pair(Vec<i64>, Vec<i64>),
}

impl Operands {
    /// Elements per operand.
    pub fn len(&self) -> usize {
        match self {
            Operands::Single(v) | Operands::Pair(v, _) => v.len(),
        }
    }

    /// No elements at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split(&self) -> (&[i64], Option<&[i64]>) {
        match self {
            Operands::Single(v) => (v.as_slice(), None),
            Operands::Pair(v, w) => (v.as_slice(), Some(w.as_slice())),
        }
    }
}

impl From<Batch> for Operands {
    fn from(batch: Batch) -> Self {
        Operands::Single(batch.values)
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Numerator, divisor and value.
    pub decoded: Decoded,
    /// Slot or coefficient the numerator was read from.
    pub output_index: usize,
    /// Multiplicative depth consumed.
    pub depth: usize,
    /// Rotation keys used.
    pub rotation_offsets: Vec<usize>,
    /// Stage timings.
    pub timings: TimingReport,
}

impl Outcome {
    /// The statistic as a float.
    pub fn value(&self) -> f64 {
        self.decoded.value
    }
}

/// Keys and plan for one configuration and input length, reusable across
/// runs with the same shape.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    plan: StatisticPlan,
    backend: BackendContext,
    encoder: VectorEncoder,
    decoder: ResultDecoder,
    setup_ms: f64,
}

impl Pipeline {
    /// Validate, plan for `n` elements per operand, and generate keys.
    ///
    /// Depth, range and rotation-key requirements are settled here; no
    /// ciphertext exists yet.
    pub fn setup(config: PipelineConfig, n: usize) -> Result<Self> {
        let mut timer = StageTimer::start(config.label());
        config.validate()?;
        let plan = config
            .composer()
            .plan(config.statistic, config.scheme, n, config.variance_method)?;
        let backend = BackendContext::keygen(config.params, &plan.rotation_offsets())?;

        let mut encoder = VectorEncoder::new(&config.params, config.scheme);
        if let Some(scaling) = config.scaling {
            encoder = encoder.with_scaling(scaling)?;
        }
        let decoder = ResultDecoder::new(&config.params).with_scaling(config.scaling);

        timer.lap(Stage::Setup);
        let setup_ms = timer.finish(0.0).setup_ms;
        info!(
            label = %config.label(),
            n,
            depth = plan.depth(),
            index = plan.output_index(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            plan,
            backend,
            encoder,
            decoder,
            setup_ms,
        })
    }

    /// The configuration this pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The statistic plan.
    pub fn plan(&self) -> &StatisticPlan {
        &self.plan
    }

    /// Backend keys and parameters.
    pub fn backend(&self) -> &BackendContext {
        &self.backend
    }

    /// Encode, encrypt, evaluate, decrypt and decode.
    pub fn run(&self, operands: &Operands) -> Result<Outcome> {
        let mut timer = StageTimer::start(self.config.label());
        let (left, right) = operands.split();

        let encoded = self.plan.encode(&self.encoder, left, right)?;
        let inputs = encoded
            .iter()
            .map(|e| e.encrypt(&self.backend))
            .collect::<Result<Vec<_>>>()?;
        timer.lap(Stage::Encryption);
        debug!(ciphertexts = inputs.len(), "encrypted operands");

        let output = self.plan.execute(&self.backend, inputs)?;
        timer.lap(Stage::Evaluation);

        let plaintext = self.backend.decrypt(&output.ciphertext)?;
        timer.lap(Stage::Decryption);

        let decoded = self.decoder.decode_plan(&plaintext, &self.plan)?;
        timer.lap(Stage::Decoding);

        let mut timings = timer.finish(decoded.value);
        timings.setup_ms = self.setup_ms;
        timings.total_ms += self.setup_ms;
        info!(
            value = decoded.value,
            numerator = %decoded.numerator,
            divisor = %decoded.divisor,
            total_ms = timings.total_ms,
            "statistic decoded"
        );

        Ok(Outcome {
            decoded,
            output_index: output.index,
            depth: output.depth,
            rotation_offsets: self.plan.rotation_offsets(),
            timings,
        })
    }
}

/// Set up for `operands` and run once.
pub fn run(config: &PipelineConfig, operands: &Operands) -> Result<Outcome> {
    Pipeline::setup(config.clone(), operands.len())?.run(operands)
}
