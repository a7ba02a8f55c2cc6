use ezrunner::{EnvSource, LlamaCppBackend, Result, Session};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .event_format(
            tracing_subscriber::fmt::format::format()
                .compact()
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
                    "%H:%M:%S.%3f".to_owned(),
                )),
        )
        .init();

    // MODEL_NAME and LLAMA_MODELS come from the environment or ./.env
    let mut session = Session::new(&EnvSource::load()?, LlamaCppBackend::default())?;

    // Example 1: One-shot generation, no history involved
    println!("\n=== Example 1: Text Generation ===\n");
    let output = session.generate("Once upon a time")?;
    println!("Prompt: Once upon a time");
    println!("Completion: {}\n", output);

    // Example 2: Multi-turn conversation
    println!("\n=== Example 2: Multi-turn Conversation ===\n");
    let response1 = session.send_message("Hello, can you introduce yourself?")?;
    println!("User: Hello, can you introduce yourself?");
    println!("Assistant: {}\n", response1);

    let response2 = session.send_message("What can you help me with?")?;
    println!("User: What can you help me with?");
    println!("Assistant: {}\n", response2);

    println!("{} turns recorded", session.history().len());

    Ok(())
}
