use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::backend::FaceDetector;
use super::backends::ScriptedDetector;
use super::result::FaceBox;

/// Inputs a detector backend may need at construction.
#[derive(Clone, Debug, Default)]
pub struct DetectorSettings {
    /// Local ONNX model path (model-backed detectors).
    pub model_path: Option<PathBuf>,
    /// Replay script for the scripted detector. `None` uses the demo script.
    pub script: Option<Vec<Vec<FaceBox>>>,
}

type DetectorFactory = Box<dyn Fn(&DetectorSettings) -> Result<Box<dyn FaceDetector>> + Send + Sync>;

/// Registry of detector backends by name.
///
/// The first registered backend becomes the default.
pub struct DetectorRegistry {
    factories: BTreeMap<&'static str, DetectorFactory>,
    default_name: Option<&'static str>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("scripted", |settings| {
            let detector = match &settings.script {
                Some(script) => ScriptedDetector::new(script.clone()),
                None => ScriptedDetector::demo(),
            };
            Ok(Box::new(detector))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
            Ok(Box::new(super::backends::TractFaceDetector::new(path)))
        });
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn FaceDetector>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name);
        }
        self.factories.insert(name, Box::new(factory));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        let (key, _) = self
            .factories
            .get_key_value(name)
            .ok_or_else(|| anyhow!("detector '{}' not registered", name))?;
        self.default_name = Some(*key);
        Ok(())
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Build a detector by name.
    pub fn build(&self, name: &str, settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "detector '{}' not available (built-in: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }

    pub fn build_default(&self, settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
        let name = self
            .default_name
            .ok_or_else(|| anyhow!("no detector registered"))?;
        self.build(name, settings)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn builds_scripted_detector_from_settings() {
        let registry = DetectorRegistry::with_builtin();
        let settings = DetectorSettings {
            script: Some(vec![vec![FaceBox::new(1.0, 2.0, 90.0, 90.0)]]),
            ..DetectorSettings::default()
        };
        let mut detector = registry.build("scripted", &settings).unwrap();
        assert_eq!(detector.name(), "scripted");

        let frame = Frame::from_rgb(vec![0u8; 3], 1, 1).unwrap();
        assert_eq!(detector.detect(&frame).unwrap().len(), 1);
    }

    #[test]
    fn unknown_detector_is_an_error() {
        let registry = DetectorRegistry::with_builtin();
        let err = registry
            .build("haar", &DetectorSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("haar"));
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = DetectorRegistry::with_builtin();
        assert!(registry.set_default("missing").is_err());
        registry.set_default("scripted").unwrap();
        let detector = registry.build_default(&DetectorSettings::default()).unwrap();
        assert_eq!(detector.name(), "scripted");
    }
}
