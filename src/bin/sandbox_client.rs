//! Command-line client for a running sandbox server.
//!
//! Uploads local files into a fresh workspace, then optionally executes one of
//! them and/or runs the test suite. Every response is printed as JSON.
//!
//! ```text
//! agentbox-client http://127.0.0.1:8000 main.py test_main.py --run main.py --test
//! ```

use std::env;
use std::path::Path;

use agentbox::SandboxClient;

const USAGE: &str = "usage: agentbox-client <base_url> <file>... [--run <name>] [--test] [--release]";

struct Args {
    base_url: String,
    files: Vec<String>,
    run: Option<String>,
    test: bool,
    release: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let base_url = args.next().ok_or(USAGE)?;
    let mut parsed = Args {
        base_url,
        files: Vec::new(),
        run: None,
        test: false,
        release: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--run" => parsed.run = Some(args.next().ok_or("--run needs a filename")?),
            "--test" => parsed.test = true,
            "--release" => parsed.release = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => parsed.files.push(arg),
        }
    }

    if parsed.files.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut uploads = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("not a file path: {path}"))?
            .to_string();
        uploads.push((name, tokio::fs::read(path).await?));
    }

    let mut client = SandboxClient::new(args.base_url);

    let uploaded = client.upload(uploads).await?;
    println!("{}", serde_json::to_string_pretty(&uploaded)?);

    if let Some(name) = &args.run {
        let result = client.execute(name).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if args.test {
        let result = client.run_tests().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if args.release {
        client.release().await?;
    }

    Ok(())
}
