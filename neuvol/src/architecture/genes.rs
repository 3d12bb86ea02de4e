use ahash::RandomState;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;

/// The kind of layer a gene describes.
///
/// Layer kinds fall in three classes: input layers,
/// which may only start an architecture, output layers,
/// which may only end it, and body layers in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    /// Token embedding, the input of text networks.
    Embedding,
    /// Raw tensor input, the input of image networks.
    Input,
    Lstm,
    Bidirectional,
    Convolution1D,
    Convolution2D,
    MaxPooling,
    Flatten,
    Dense,
    Dropout,
    /// Classification head.
    LastDense,
}

impl LayerType {
    /// Returns whether genes of this type can start an architecture.
    ///
    /// # Examples
    /// ```
    /// use neuvol::architecture::LayerType;
    ///
    /// assert!(LayerType::Embedding.is_input());
    /// assert!(!LayerType::Dense.is_input());
    /// ```
    pub fn is_input(self) -> bool {
        matches!(self, Self::Embedding | Self::Input)
    }

    /// Returns whether genes of this type can end an architecture.
    pub fn is_output(self) -> bool {
        matches!(self, Self::LastDense)
    }

    /// Returns whether genes of this type belong between
    /// the input and output genes.
    pub fn is_body(self) -> bool {
        !self.is_input() && !self.is_output()
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::Input => "input",
            Self::Lstm => "lstm",
            Self::Bidirectional => "bi",
            Self::Convolution1D => "cnn",
            Self::Convolution2D => "cnn2",
            Self::MaxPooling => "max_pool",
            Self::Flatten => "flatten",
            Self::Dense => "dense",
            Self::Dropout => "dropout",
            Self::LastDense => "last_dense",
        };
        f.write_str(name)
    }
}

/// A single configuration value of a layer or
/// of a free-form genotype knob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Int(i64),
    Float(f32),
    Text(String),
}

impl Parameter {
    /// Returns the value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers are converted.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Int(i) => Some(*i as f32),
            Self::Float(x) => Some(*x),
            Self::Text(_) => None,
        }
    }

    /// Returns the value as a string slice, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Parameter {
    fn from(i: i64) -> Parameter {
        Parameter::Int(i)
    }
}

impl From<i32> for Parameter {
    fn from(i: i32) -> Parameter {
        Parameter::Int(i as i64)
    }
}

impl From<usize> for Parameter {
    fn from(i: usize) -> Parameter {
        Parameter::Int(i as i64)
    }
}

impl From<f32> for Parameter {
    fn from(x: f32) -> Parameter {
        Parameter::Float(x)
    }
}

impl From<f64> for Parameter {
    fn from(x: f64) -> Parameter {
        Parameter::Float(x as f32)
    }
}

impl From<&str> for Parameter {
    fn from(s: &str) -> Parameter {
        Parameter::Text(s.to_string())
    }
}

/// A map of named parameters.
pub type Parameters = HashMap<String, Parameter, RandomState>;

/// Layer genes are the elements of an architecture.
///
/// Beyond its type tag, a gene's configuration is
/// opaque to crossover; it is only interpreted by
/// the training backend that builds the network.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LayerGene {
    layer_type: LayerType,
    config: Parameters,
}

impl LayerGene {
    /// Returns a new gene of the specified type with
    /// an empty configuration.
    ///
    /// # Examples
    /// ```
    /// use neuvol::architecture::{LayerGene, LayerType};
    ///
    /// let gene = LayerGene::new(LayerType::Dense).with("units", 32);
    ///
    /// assert_eq!(gene.layer_type(), LayerType::Dense);
    /// assert_eq!(gene.get("units").and_then(|p| p.as_int()), Some(32));
    /// ```
    pub fn new(layer_type: LayerType) -> LayerGene {
        LayerGene {
            layer_type,
            config: Parameters::default(),
        }
    }

    /// Builder-style parameter assignment.
    pub fn with(mut self, name: &str, value: impl Into<Parameter>) -> LayerGene {
        self.set(name, value);
        self
    }

    /// Sets the named parameter, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Parameter>) {
        self.config.insert(name.to_string(), value.into());
    }

    /// Returns the named parameter.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.config.get(name)
    }

    /// Returns the gene's layer type.
    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    /// Returns an iterator over the gene's parameters.
    /// No ordering is guaranteed.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.config.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for LayerGene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<_> = self.config.iter().collect();
        params.sort_unstable_by(|a, b| a.0.cmp(b.0));
        write!(f, "{}(", self.layer_type)?;
        for (i, (name, value)) in params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Parameter::Int(v) => write!(f, "{}={}", name, v)?,
                Parameter::Float(v) => write!(f, "{}={:.3}", name, v)?,
                Parameter::Text(v) => write!(f, "{}={}", name, v)?,
            }
        }
        write!(f, ")")
    }
}
