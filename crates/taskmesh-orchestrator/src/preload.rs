//! Resource id → preload call table.

use taskmesh_core::Capability;

const VOICE_MODELS: &[&str] = &["whisper", "tts"];
const IMAGE_MODELS: &[&str] = &["sdxl"];
const CODE_MODELS: &[&str] = &["codellama"];

/// Backend and model list to warm up for a resource id, if any.
pub fn preload_target(resource_id: &str) -> Option<(Capability, &'static [&'static str])> {
    match resource_id {
        "voice_models" => Some((Capability::Voice, VOICE_MODELS)),
        "image_models" => Some((Capability::Image, IMAGE_MODELS)),
        "code_models" => Some((Capability::Code, CODE_MODELS)),
        _ => None,
    }
}
