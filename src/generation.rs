use crate::error::{BackendError, Result};
use encoding_rs::CoderResult;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use std::time::Instant;
use tracing::{debug, info, trace};

/// A single completion over a fresh llama context.
///
/// The context is dropped with the completion, so nothing carries over from
/// one backend call to the next.
pub(crate) struct Completion<'a> {
    /// Reference to the loaded model
    model: &'a LlamaModel,
    /// The llama context for this completion
    ctx: LlamaContext<'a>,
    /// UTF-8 decoder
    decoder: encoding_rs::Decoder,
    /// The llama sampler for this completion
    sampler: LlamaSampler,
}

impl<'a> Completion<'a> {
    pub(crate) fn new(model: &'a LlamaModel, ctx: LlamaContext<'a>, seed: u32) -> Self {
        Self {
            model,
            ctx,
            decoder: encoding_rs::UTF_8.new_decoder(),
            sampler: LlamaSampler::chain_simple([
                LlamaSampler::dist(seed),
                LlamaSampler::greedy(),
            ]),
        }
    }

    /// Feed `prompt` and sample up to `max_tokens` tokens
    pub(crate) fn run(mut self, prompt: &str, max_tokens: i32) -> Result<String> {
        trace!("Completion prompt: {}", prompt);

        let tokens_list = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| BackendError::Tokenization(format!("failed to tokenize prompt: {}", e)))?;

        if tokens_list.is_empty() {
            return Err(BackendError::Tokenization("prompt produced no tokens".to_string()).into());
        }

        let n_prompt = tokens_list.len() as i32;
        let n_ctx = self.ctx.n_ctx() as i32;
        let n_kv_req = n_prompt + max_tokens;

        info!(
            "max_tokens = {}, n_prompt = {}, n_ctx = {}, k_kv_req = {}",
            max_tokens, n_prompt, n_ctx, n_kv_req
        );

        // make sure the KV cache is big enough to hold all the prompt and generated tokens
        if n_kv_req > n_ctx {
            return Err(BackendError::KVCacheSize(format!(
                "the prompt ({} tokens) plus {} generated tokens does not fit in a context of {}",
                n_prompt, max_tokens, n_ctx
            ))
            .into());
        }

        let mut batch = LlamaBatch::get_one(&tokens_list).map_err(|e| {
            BackendError::Batch(format!("Failed to create batch from prompt tokens: {}", e))
        })?;

        let mut n_decode = 0;
        let mut output = String::new();
        let mut token_text = String::with_capacity(93);

        let sampling_start = Instant::now();

        while n_decode < max_tokens {
            self.ctx
                .decode(&mut batch)
                .map_err(|e| BackendError::Decoding(format!("llama_decode() failed: {}", e)))?;

            let token = self.sampler.sample(&self.ctx, -1);
            self.sampler.accept(token);

            if self.model.is_eog_token(token) {
                trace!("End of generation token detected: {token}");
                break;
            }

            let output_bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| {
                    BackendError::Tokenization(format!("Failed to convert token to bytes: {}", e))
                })?;
            token_text.clear();
            decode_bytes(&mut self.decoder, &output_bytes, &mut token_text, false);
            trace!(name: "token-gen", "Generated token: {}", token_text);
            output.push_str(&token_text);

            batch = LlamaBatch::get_one(&[token]).map_err(|e| {
                BackendError::Batch(format!(
                    "Failed to create batch from generated token: {}",
                    e
                ))
            })?;

            n_decode += 1;
        }

        // flush a multi-byte character cut off by the token budget
        decode_bytes(&mut self.decoder, &[], &mut output, true);

        let duration = sampling_start.elapsed();

        info!(
            "decoded {} tokens in {:.2} s, speed {:.2} t/s",
            n_decode,
            duration.as_secs_f32(),
            n_decode as f32 / duration.as_secs_f32()
        );

        debug!("Timings: {}", self.ctx.timings());

        Ok(output)
    }
}

/// Decode `bytes` into `dst`, growing it as needed.
///
/// Incomplete trailing sequences stay buffered in `decoder` until the next
/// call; pass `last` to flush them.
fn decode_bytes(
    decoder: &mut encoding_rs::Decoder,
    mut bytes: &[u8],
    dst: &mut String,
    last: bool,
) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        dst.reserve(needed);

        let (result, read, _replaced) = decoder.decode_to_string(bytes, dst, last);
        bytes = &bytes[read..];
        if result == CoderResult::InputEmpty {
            break;
        }
    }
}
