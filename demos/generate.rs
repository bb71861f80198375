use codex_cli_rs::{
    ApprovalMode, CodexCliProvider, CodexCliSettings, GenerateRequest, ResponseFormat,
    SandboxMode,
};

#[tokio::main]
async fn main() -> codex_cli_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let provider = CodexCliProvider::new(CodexCliSettings {
        approval_mode: Some(ApprovalMode::Never),
        sandbox_mode: Some(SandboxMode::ReadOnly),
        ..Default::default()
    });
    let model = provider.language_model("gpt-5")?;

    let request = GenerateRequest {
        response_format: Some(ResponseFormat::Json {
            schema: Some(serde_json::json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "integer"}
                },
                "required": ["answer"]
            })),
        }),
        ..GenerateRequest::new("What is 2+2? Reply as JSON.")
    };

    let result = model.generate(request).await?;
    println!("Codex says: {}", result.text());
    println!(
        "Tokens: {} in / {} out",
        result.usage.input_tokens, result.usage.output_tokens
    );
    if let Some(session) = result.session_id() {
        println!("Session: {session}");
    }
    Ok(())
}
