use ezrunner::{BackendParams, EnvSource, LlamaCppBackend, Result, Session};
use std::io::{self, BufRead, Write};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|arg| arg == "--verbose" || arg == "-v");

    let env_filter = if verbose {
        EnvFilter::builder()
            .with_default_directive(Level::DEBUG.into())
            .from_env_lossy()
    } else {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy()
    };

    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let params = BackendParams {
        max_tokens: 1024,
        ctx_size: Some(4096),
        ..Default::default()
    };

    // MODEL_NAME and LLAMA_MODELS come from the environment or ./.env
    let mut session = Session::new(&EnvSource::load()?, LlamaCppBackend::new(params))?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "Mode (chat/generate/reset/exit): ")?;
        stdout.flush()?;
        let Some(mode) = lines.next().transpose()? else {
            break;
        };

        match mode.trim().to_lowercase().as_str() {
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "reset" => {
                session.reset();
                println!("Conversation cleared!");
                continue;
            }
            "chat" | "generate" => {}
            _ => {
                println!("Unknown mode, try again.");
                continue;
            }
        }

        write!(stdout, "Prompt: ")?;
        stdout.flush()?;
        let Some(prompt) = lines.next().transpose()? else {
            break;
        };

        let result = if mode.trim().eq_ignore_ascii_case("chat") {
            session.send_message(prompt.trim())
        } else {
            session.generate(prompt.trim())
        };

        match result {
            Ok(reply) => println!("Model: {}\n", reply),
            Err(e) => eprintln!("Error generating response: {}", e),
        }
    }

    Ok(())
}
