//! Local inference backend built on llama.cpp.

use crate::backend::{Backend, ChatResponse, GenerateResponse};
use crate::chat::{ChatTemplateFormat, Turn, render_default_template};
use crate::error::{BackendError, Error, Result};
use crate::generation::Completion;
use crate::storage;
use lazy_static::lazy_static;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{LlamaChatMessage, LlamaModel};
use llama_cpp_2::{LogOptions, send_logs_to_tracing};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// Initialize the LlamaBackend globally
lazy_static! {
    static ref LLAMA_BACKEND: std::result::Result<LlamaBackend, String> = {
        send_logs_to_tracing(LogOptions::default().with_logs_enabled(false));
        LlamaBackend::init().map_err(|e| e.to_string())
    };
}

fn llama_backend() -> Result<&'static LlamaBackend> {
    match &*LLAMA_BACKEND {
        Ok(backend) => Ok(backend),
        Err(e) => Err(BackendError::BackendInit(e.clone()).into()),
    }
}

/// Parameters for the llama.cpp backend
#[derive(Debug, Clone)]
pub struct BackendParams {
    /// Maximum number of tokens generated per call (default: 512)
    pub max_tokens: usize,
    /// RNG seed (default: 1234)
    pub seed: Option<u32>,
    /// number of threads to use during generation (default: use all available threads)
    pub threads: Option<usize>,
    /// number of threads to use during batch and prompt processing (default: use all available threads)
    pub threads_batch: Option<usize>,
    /// size of the prompt context (default: loaded from the model)
    pub ctx_size: Option<usize>,
    /// How chat transcripts are turned into prompts
    pub template_format: ChatTemplateFormat,
    /// Disable offloading layers to the gpu
    pub disable_gpu: bool,
    #[doc(hidden)]
    pub _non_exhaustive: (),
}

impl Default for BackendParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            seed: None,
            threads: None,
            threads_batch: None,
            ctx_size: None,
            template_format: ChatTemplateFormat::ModelDefault,
            disable_gpu: false,
            _non_exhaustive: (),
        }
    }
}

/// A [`Backend`] running GGUF models in-process with llama.cpp.
///
/// Model identifiers are resolved to files with [`resolve_model_path`] on
/// every call, and loaded models are kept per file for the lifetime of the
/// backend.
pub struct LlamaCppBackend {
    params: BackendParams,
    models: ModelCache<LlamaModel>,
}

/// Loaded models keyed by the file they were loaded from
struct ModelCache<M> {
    models: Mutex<HashMap<PathBuf, Arc<M>>>,
}

impl<M> ModelCache<M> {
    fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_load(
        &self,
        path: &Path,
        load: impl FnOnce(&Path) -> Result<M>,
    ) -> Result<Arc<M>> {
        let mut models = self
            .models
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = models.get(path) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(load(path)?);
        models.insert(path.to_path_buf(), Arc::clone(&model));
        Ok(model)
    }
}

impl LlamaCppBackend {
    /// Create a backend with the given parameters
    pub fn new(params: BackendParams) -> Self {
        Self {
            params,
            models: ModelCache::new(),
        }
    }

    /// The parameters this backend was created with
    pub fn params(&self) -> &BackendParams {
        &self.params
    }

    fn model(&self, identifier: &str) -> Result<Arc<LlamaModel>> {
        let path = resolve_model_path(identifier, storage::storage_location().as_deref())?;
        self.models.get_or_load(&path, |path| {
            info!("Loading model '{}' from {}", identifier, path.display());

            let model_params = {
                #[cfg(any(feature = "cuda", feature = "vulkan"))]
                let params = if !self.params.disable_gpu {
                    LlamaModelParams::default().with_n_gpu_layers(1000)
                } else {
                    LlamaModelParams::default()
                };
                #[cfg(not(any(feature = "cuda", feature = "vulkan")))]
                let params = LlamaModelParams::default();
                params
            };

            LlamaModel::load_from_file(llama_backend()?, path, &model_params).map_err(|e| {
                Error::BackendError(BackendError::ModelLoad(format!(
                    "unable to load model: {}",
                    e
                )))
            })
        })
    }

    fn complete(&self, model: &LlamaModel, prompt: &str) -> Result<String> {
        let mut ctx_params = LlamaContextParams::default().with_n_ctx(
            self.params
                .ctx_size
                .map(|n| n as u32)
                .and_then(NonZeroU32::new),
        );

        if let Some(threads) = self.params.threads {
            ctx_params = ctx_params.with_n_threads(threads as i32);
        }
        if let Some(threads_batch) = self.params.threads_batch.or(self.params.threads) {
            ctx_params = ctx_params.with_n_threads_batch(threads_batch as i32);
        }

        let ctx = model
            .new_context(llama_backend()?, ctx_params)
            .map_err(|e| {
                BackendError::ContextCreation(format!("unable to create the llama_context: {}", e))
            })?;

        Completion::new(model, ctx, self.params.seed.unwrap_or(1234))
            .run(prompt, self.params.max_tokens as i32)
    }

    fn format_transcript(&self, model: &LlamaModel, messages: &[Turn]) -> Result<String> {
        if self.params.template_format == ChatTemplateFormat::Default {
            return Ok(render_default_template(messages));
        }

        let template = match model.get_chat_template() {
            Ok(template) => template,
            Err(e) => {
                debug!("Model has no usable chat template ({}), using default", e);
                return Ok(render_default_template(messages));
            }
        };

        let chat = messages
            .iter()
            .map(|message| {
                LlamaChatMessage::new(message.role.as_str().to_string(), message.content.clone())
                    .map_err(|e| BackendError::ChatTemplate(format!("invalid message: {}", e)))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let prompt = model
            .apply_chat_template(&template, &chat, true)
            .map_err(|e| BackendError::ChatTemplate(format!("failed to apply template: {}", e)))?;
        Ok(prompt)
    }
}

impl Default for LlamaCppBackend {
    fn default() -> Self {
        Self::new(BackendParams::default())
    }
}

impl Backend for LlamaCppBackend {
    fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse> {
        let llama_model = self.model(model)?;
        let text = self.complete(&llama_model, prompt)?;
        Ok(GenerateResponse { text })
    }

    fn chat(&self, model: &str, messages: &[Turn]) -> Result<ChatResponse> {
        let llama_model = self.model(model)?;
        let prompt = self.format_transcript(&llama_model, messages)?;
        debug!(turns = messages.len(), "Chat prompt: {}", prompt);
        let reply = self.complete(&llama_model, &prompt)?;
        Ok(ChatResponse::assistant(reply.trim()))
    }
}

/// Resolve a model identifier to a model file.
///
/// Absolute paths and paths to existing files are used as given. Anything
/// else is looked up in `storage_location` (the current directory when
/// unset), first as `<identifier>` and then as `<identifier>.gguf`.
pub fn resolve_model_path(identifier: &str, storage_location: Option<&Path>) -> Result<PathBuf> {
    let direct = Path::new(identifier);
    if direct.is_absolute() || direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    let base = storage_location.unwrap_or_else(|| Path::new("."));
    let candidates = [
        base.join(identifier),
        base.join(format!("{}.gguf", identifier)),
    ];
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            BackendError::ModelLoad(format!(
                "no model file for '{}' in {}",
                identifier,
                base.display()
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_resolve_in_storage_location() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("demo-model.gguf")).unwrap();

        let path = resolve_model_path("demo-model", Some(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("demo-model.gguf"));
    }

    #[test]
    fn test_resolve_exact_file_name_first() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("tiny.Q4_1.gguf")).unwrap();

        let path = resolve_model_path("tiny.Q4_1.gguf", Some(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("tiny.Q4_1.gguf"));
    }

    #[test]
    fn test_resolve_absolute_path() {
        let path = resolve_model_path("/models/elsewhere.gguf", None).unwrap();
        assert_eq!(path, PathBuf::from("/models/elsewhere.gguf"));
    }

    #[test]
    fn test_unresolvable_model_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_model_path("missing-model", Some(dir.path())).unwrap_err();
        assert!(err.is_backend());
    }

    #[test]
    fn test_cache_follows_resolved_file() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        File::create(first.path().join("demo-model.gguf")).unwrap();
        File::create(second.path().join("demo-model.gguf")).unwrap();

        let cache = ModelCache::new();
        let mut loads = 0;
        let mut load = |location: &Path| {
            let path = resolve_model_path("demo-model", Some(location)).unwrap();
            cache
                .get_or_load(&path, |path| {
                    loads += 1;
                    Ok(path.display().to_string())
                })
                .unwrap()
        };

        let a = load(first.path());
        let again = load(first.path());
        let b = load(second.path());

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(*b, second.path().join("demo-model.gguf").display().to_string());
        assert_ne!(a, b);
        assert_eq!(loads, 2);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache: ModelCache<String> = ModelCache::new();
        let path = Path::new("/models/broken.gguf");

        let err = cache
            .get_or_load(path, |_| Err(BackendError::ModelLoad("truncated".to_string()).into()))
            .unwrap_err();
        assert!(err.is_backend());

        let model = cache
            .get_or_load(path, |_| Ok("loaded".to_string()))
            .unwrap();
        assert_eq!(*model, "loaded");
    }

    #[test]
    fn test_default_params() {
        let backend = LlamaCppBackend::default();
        assert_eq!(backend.params().max_tokens, 512);
        assert_eq!(backend.params().template_format, ChatTemplateFormat::ModelDefault);
    }
}
