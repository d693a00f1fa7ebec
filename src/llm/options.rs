use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model options sent with every generate request.
///
/// The typed fields are the ones this crate understands and validates.
/// Anything else in `extra` is flattened next to them on the wire untouched,
/// so new backend options can be used without a code change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionsError {
    #[error("num_ctx must be positive")]
    ZeroContextWindow,
    #[error("temperature {0} is outside 0..=2")]
    Temperature(f64),
    #[error("top_p {0} is outside (0, 1]")]
    TopP(f64),
    #[error("option {0} shadows a typed option; set it directly instead")]
    Shadowed(String),
    #[error("option {0} must be a string, number or boolean")]
    NotScalar(String),
}

const TYPED_KEYS: [&str; 3] = ["num_ctx", "temperature", "top_p"];

impl InferenceOptions {
    pub fn is_empty(&self) -> bool {
        self.num_ctx.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.extra.is_empty()
    }

    /// Check the recognised keys. Passthrough values only need to be scalars.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.num_ctx == Some(0) {
            return Err(OptionsError::ZeroContextWindow);
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(OptionsError::Temperature(t));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(OptionsError::TopP(p));
            }
        }
        for (key, value) in &self.extra {
            if TYPED_KEYS.contains(&key.as_str()) {
                return Err(OptionsError::Shadowed(key.clone()));
            }
            if !(value.is_string() || value.is_number() || value.is_boolean()) {
                return Err(OptionsError::NotScalar(key.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_flat() {
        let mut options = InferenceOptions {
            num_ctx: Some(4096),
            temperature: None,
            top_p: Some(0.9),
            extra: BTreeMap::new(),
        };
        options.extra.insert("seed".to_string(), json!(7));

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value, json!({"num_ctx": 4096, "top_p": 0.9, "seed": 7}));
    }

    #[test]
    fn test_empty_options() {
        assert!(InferenceOptions::default().is_empty());
        assert_eq!(InferenceOptions::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_ranges() {
        let options = InferenceOptions {
            temperature: Some(2.5),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::Temperature(2.5)));

        let options = InferenceOptions {
            top_p: Some(0.0),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::TopP(0.0)));

        let options = InferenceOptions {
            num_ctx: Some(0),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::ZeroContextWindow));
    }

    #[test]
    fn test_validate_passthrough() {
        let mut options = InferenceOptions::default();
        options.extra.insert("mirostat".to_string(), json!(2));
        options.extra.insert("penalize_newline".to_string(), json!(false));
        assert_eq!(options.validate(), Ok(()));

        options.extra.insert("stop".to_string(), json!(["a", "b"]));
        assert_eq!(
            options.validate(),
            Err(OptionsError::NotScalar("stop".to_string()))
        );

        let mut options = InferenceOptions::default();
        options.extra.insert("temperature".to_string(), json!(0.3));
        assert_eq!(
            options.validate(),
            Err(OptionsError::Shadowed("temperature".to_string()))
        );
    }
}
