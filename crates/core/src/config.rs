//! Template configuration types.
//!
//! These are read-only inputs to the template builder. The server loads them
//! from the `templates` section of its configuration file; every field is
//! optional so a partial section only overrides what it names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::templates::Template;

/// A named bundle of defaults layered between explicit parameters and the
/// template configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantPreset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
}

impl VariantPreset {
    /// Preset with every field set.
    pub fn new(model: &str, steps: u32, cfg: f64, sampler: &str, scheduler: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            steps: Some(steps),
            cfg: Some(cfg),
            sampler: Some(sampler.to_string()),
            scheduler: Some(scheduler.to_string()),
        }
    }
}

/// Per-template configuration defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDefaults {
    /// Disabled templates are rejected by the tool layer.
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_cfg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sampler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_scheduler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_denoise: Option<f64>,
    /// Extra variants, consulted before the template's built-in variants.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub variants: IndexMap<String, VariantPreset>,
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            default_model: None,
            default_steps: None,
            default_cfg: None,
            default_sampler: None,
            default_scheduler: None,
            default_denoise: None,
            variants: IndexMap::new(),
        }
    }
}

impl TemplateDefaults {
    fn preset(model: Option<&str>, steps: u32, cfg: f64, sampler: &str, scheduler: &str) -> Self {
        Self {
            default_model: model.map(str::to_string),
            default_steps: Some(steps),
            default_cfg: Some(cfg),
            default_sampler: Some(sampler.to_string()),
            default_scheduler: Some(scheduler.to_string()),
            ..Self::default()
        }
    }
}

/// The `templates` configuration section, one entry per built-in template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub flux_txt2img: TemplateDefaults,
    pub sd15_txt2img: TemplateDefaults,
    pub sdxl_txt2img: TemplateDefaults,
    pub basic_img2img: TemplateDefaults,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            flux_txt2img: TemplateDefaults::preset(
                Some("flux1-dev.safetensors"),
                20,
                3.5,
                "euler",
                "simple",
            ),
            sd15_txt2img: TemplateDefaults::preset(
                Some("v1-5-pruned-emaonly.safetensors"),
                20,
                7.0,
                "dpmpp_2m",
                "karras",
            ),
            sdxl_txt2img: TemplateDefaults::preset(
                Some("sd_xl_base_1.0.safetensors"),
                20,
                7.0,
                "dpmpp_2m_sde",
                "karras",
            ),
            basic_img2img: TemplateDefaults {
                default_denoise: Some(0.75),
                ..TemplateDefaults::preset(None, 20, 7.0, "dpmpp_2m", "karras")
            },
        }
    }
}

impl TemplatesConfig {
    pub fn get(&self, template: Template) -> &TemplateDefaults {
        match template {
            Template::FluxTxt2Img => &self.flux_txt2img,
            Template::Sd15Txt2Img => &self.sd15_txt2img,
            Template::SdxlTxt2Img => &self.sdxl_txt2img,
            Template::BasicImg2Img => &self.basic_img2img,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateParams;
    use serde_json::json;

    #[test]
    fn partial_section_keeps_other_templates() {
        let config: TemplatesConfig = serde_json::from_value(json!({
            "sd15_txt2img": { "enabled": false, "default_steps": 30 }
        }))
        .unwrap();

        assert!(!config.sd15_txt2img.enabled);
        assert_eq!(config.sd15_txt2img.default_steps, Some(30));
        assert_eq!(config.sd15_txt2img.default_cfg, None);
        assert_eq!(config.sdxl_txt2img, TemplatesConfig::default().sdxl_txt2img);
    }

    #[test]
    fn template_entry_defaults_to_enabled() {
        let defaults: TemplateDefaults = serde_json::from_value(json!({})).unwrap();
        assert!(defaults.enabled);
        assert!(defaults.variants.is_empty());
    }

    #[test]
    fn variants_deserialize_from_config() {
        let defaults: TemplateDefaults = serde_json::from_value(json!({
            "variants": { "turbo": { "steps": 8, "cfg": 2.0 } }
        }))
        .unwrap();

        let turbo = &defaults.variants["turbo"];
        assert_eq!(turbo.steps, Some(8));
        assert_eq!(turbo.model, None);
    }

    #[test]
    fn get_returns_matching_section() {
        let config = TemplatesConfig::default();
        assert_eq!(config.get(Template::BasicImg2Img).default_denoise, Some(0.75));
        assert_eq!(
            config.get(Template::SdxlTxt2Img).default_sampler.as_deref(),
            Some("dpmpp_2m_sde")
        );
    }

    #[test]
    fn configured_flux_model_matches_builtin_fallback() {
        let config = TemplatesConfig::default();
        let params = TemplateParams {
            prompt: "a fox".into(),
            ..Default::default()
        };
        let configured = Template::FluxTxt2Img.resolve(&params, config.get(Template::FluxTxt2Img));
        let fallback = Template::FluxTxt2Img.resolve(&params, &TemplateDefaults::default());
        assert_eq!(configured.model, "flux1-dev.safetensors");
        assert_eq!(configured.model, fallback.model);
    }
}
