use codex_cli_rs::{AbortSignal, CodexCliSettings, CodexLanguageModel, GenerateRequest, StreamPart};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> codex_cli_rs::Result<()> {
    // Debug level also surfaces the CLI's stderr under `codex_cli_stderr`.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let model = CodexLanguageModel::new(
        "gpt-5-codex",
        CodexCliSettings {
            full_auto: Some(true),
            ..Default::default()
        },
    )?;

    let abort = AbortSignal::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.abort("interrupted");
        }
    });

    let request = GenerateRequest {
        abort_signal: Some(abort),
        ..GenerateRequest::new("List the files in this directory and describe the project.")
    };

    let mut stream = model.stream(request).await?;
    while let Some(part) = stream.next().await {
        match part? {
            StreamPart::ToolCall(call) => println!("[tool] {} {}", call.tool_name, call.input),
            StreamPart::ToolResult(result) if result.is_error => {
                println!("[tool] {} failed", result.tool_name)
            }
            StreamPart::TextDelta { delta, .. } => print!("{delta}"),
            StreamPart::Finish { usage, .. } => {
                println!("\n---");
                println!("Tokens: {}", usage.total_tokens());
            }
            _ => {}
        }
    }

    Ok(())
}
