//! Integration tests for the parse -> override -> serialize pipeline.
//!
//! Exercises the graph model, classifier, override engine and template
//! builder together on realistic ComfyUI workflows.

use comfy_mcp_core::classify::{is_lora_loader, is_sampler};
use comfy_mcp_core::config::TemplatesConfig;
use comfy_mcp_core::graph::{parse_workflow, NodeLink};
use comfy_mcp_core::overrides::{apply_overrides, LoraSpec, WorkflowOverrides};
use comfy_mcp_core::templates::{Template, TemplateParams};
use comfy_mcp_core::upload::NoStaging;
use serde_json::json;

/// A workflow as exported by the ComfyUI "Save (API)" menu, including a
/// custom node and extra metadata that must survive untouched.
fn exported_workflow() -> serde_json::Value {
    json!({
        "3": {
            "inputs": {
                "seed": 156680208700286u64,
                "steps": 20,
                "cfg": 8,
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": 1,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            },
            "class_type": "KSampler",
            "_meta": { "title": "KSampler" }
        },
        "4": {
            "inputs": { "ckpt_name": "v1-5-pruned-emaonly.safetensors" },
            "class_type": "CheckpointLoaderSimple",
            "_meta": { "title": "Load Checkpoint" }
        },
        "5": {
            "inputs": { "width": 512, "height": 512, "batch_size": 1 },
            "class_type": "EmptyLatentImage",
            "_meta": { "title": "Empty Latent Image" }
        },
        "6": {
            "inputs": { "text": "beautiful scenery", "clip": ["4", 1] },
            "class_type": "CLIPTextEncode",
            "_meta": { "title": "CLIP Text Encode (Prompt)", "color": "#232" }
        },
        "7": {
            "inputs": { "text": "text, watermark", "clip": ["4", 1] },
            "class_type": "CLIPTextEncode",
            "_meta": { "title": "Negative" }
        },
        "8": {
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] },
            "class_type": "VAEDecode",
            "_meta": { "title": "VAE Decode" }
        },
        "9": {
            "inputs": { "filename_prefix": "ComfyUI", "images": ["8", 0] },
            "class_type": "SaveImage",
            "_meta": { "title": "Save Image" }
        },
        "10": {
            "inputs": { "image": ["8", 0], "scale": [1.5, 2] },
            "class_type": "CustomUpscaler",
            "is_changed": null
        }
    })
}

// ---------------------------------------------------------------------------
// Test: lossless round trip
// ---------------------------------------------------------------------------

/// Parsing and re-serializing without overrides reproduces the input exactly,
/// including unknown node types, literal pairs and extra metadata.
#[test]
fn unmodified_workflow_round_trips() {
    let json = exported_workflow();
    let workflow = parse_workflow(&json).unwrap();
    let outcome = apply_overrides(&workflow, &WorkflowOverrides::default(), &NoStaging).unwrap();
    assert_eq!(outcome.workflow.to_value().unwrap(), json);
}

// ---------------------------------------------------------------------------
// Test: overrides on an exported workflow
// ---------------------------------------------------------------------------

/// A prompt titled with the default export title ("CLIP Text Encode (Prompt)")
/// is not recognised as positive, so the positive prompt override is skipped
/// while the rest of the set is still applied.
#[test]
fn unrecognised_prompt_title_is_reported_not_fatal() {
    let workflow = parse_workflow(&exported_workflow()).unwrap();
    let overrides = WorkflowOverrides {
        positive_prompt: Some("a lighthouse".into()),
        negative_prompt: Some("blurry".into()),
        steps: Some(28),
        ..Default::default()
    };

    let outcome = apply_overrides(&workflow, &overrides, &NoStaging).unwrap();
    let json = outcome.workflow.to_value().unwrap();

    assert_eq!(json["6"]["inputs"]["text"], "beautiful scenery");
    assert_eq!(json["7"]["inputs"]["text"], "blurry");
    assert_eq!(json["3"]["inputs"]["steps"], 28);
    assert!(outcome.report.is_skipped("positive_prompt"));
    assert!(outcome.report.is_applied("negative_prompt"));
}

/// A checkpoint-only export has no CLIP loader to anchor a LoRA chain, so
/// the LoRA override is skipped and the graph comes back unchanged.
#[test]
fn lora_on_checkpoint_export_is_skipped() {
    let workflow = parse_workflow(&exported_workflow()).unwrap();
    let overrides = WorkflowOverrides {
        lora: vec![LoraSpec::new("film_grain.safetensors")],
        ..Default::default()
    };

    let outcome = apply_overrides(&workflow, &overrides, &NoStaging).unwrap();
    assert_eq!(outcome.workflow, workflow);
    assert!(outcome.report.is_skipped("lora"));
    assert!(outcome.workflow.find_all(is_lora_loader).is_empty());
}

/// With a standalone CLIP loader the chain is wired from the checkpoint's
/// MODEL output and the loader's CLIP output; other nodes are left alone.
#[test]
fn lora_insertion_into_exported_workflow() {
    let mut json = exported_workflow();
    json["12"] = json!({
        "class_type": "CLIPLoader",
        "inputs": { "clip_name": "clip_l.safetensors", "type": "stable_diffusion" }
    });
    let workflow = parse_workflow(&json).unwrap();
    let overrides = WorkflowOverrides {
        lora: vec![LoraSpec::new("film_grain.safetensors")],
        ..Default::default()
    };

    let outcome = apply_overrides(&workflow, &overrides, &NoStaging).unwrap();
    let wf = &outcome.workflow;

    let loras = wf.find_all(is_lora_loader);
    assert_eq!(loras, vec!["13".to_string()]);
    let lora = wf.get("13").unwrap();
    assert_eq!(lora.link("model"), Some(&NodeLink::new("4", 0)));
    assert_eq!(lora.link("clip"), Some(&NodeLink::new("12", 0)));
    assert_eq!(wf.get("3").unwrap().link("model"), Some(&NodeLink::new("13", 0)));
    // Untitled-as-positive encoder keeps its original CLIP source.
    assert_eq!(wf.get("6").unwrap().link("clip"), Some(&NodeLink::new("4", 1)));
    assert_eq!(wf.get("7").unwrap().link("clip"), Some(&NodeLink::new("13", 1)));
    assert_eq!(wf.get("10").unwrap().class_type, "CustomUpscaler");
    assert!(wf.dangling_links().is_empty());
}

// ---------------------------------------------------------------------------
// Test: templates feed the override engine
// ---------------------------------------------------------------------------

/// A template-built workflow is a valid override target: a second LoRA pass
/// replaces the chain the template inserted.
#[test]
fn template_output_accepts_overrides() {
    let params = TemplateParams {
        prompt: "a red fox in snow".into(),
        variant: Some("schnell".into()),
        lora: vec![LoraSpec::new("a.safetensors"), LoraSpec::new("b.safetensors")],
        ..Default::default()
    };
    let config = TemplatesConfig::default();
    let built = Template::FluxTxt2Img.build(&params, config.get(Template::FluxTxt2Img));

    let overrides = WorkflowOverrides {
        lora: vec![LoraSpec::new("c.safetensors")],
        cfg: Some(1.5),
        ..Default::default()
    };
    let outcome = apply_overrides(&built, &overrides, &NoStaging).unwrap();
    let wf = &outcome.workflow;

    let loras = wf.find_all(is_lora_loader);
    assert_eq!(loras.len(), 1);
    let sampler = wf.get(&wf.find_first(is_sampler).unwrap()).unwrap();
    assert_eq!(sampler.link("model"), Some(&NodeLink::new(loras[0].clone(), 0)));
    assert_eq!(sampler.input("cfg").unwrap().as_f64(), Some(1.5));
    assert_eq!(sampler.input("steps").unwrap().as_u64(), Some(4));
    assert!(wf.dangling_links().is_empty());
    assert_eq!(wf.summary(), "generation, custom model, with LoRA");
}
