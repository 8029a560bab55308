//! 命令行演示
//!
//! 用法：
//!
//! ```text
//! openai-streaming [--chat] [--blocking] [--config <path>] [--model <name>] <prompt...>
//! ```
//!
//! 配置来自 `~/.openai-streaming/config.yaml`（或 `--config` 指定的文件），
//! 环境变量 `OPENAI_API_KEY` / `OPENAI_ORG_ID` / `OPENAI_ORIGIN` 优先。

use anyhow::{bail, Context};
use clap::Parser;
use openai_streaming_lib::{
    AccumulatedValue, ChatCompletionRequest, ChatMessage, ClientConfig, CompletionRequest,
    CompletionStatus, OpenAIClient, StreamingCompletion,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "openai-streaming")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 使用聊天补全接口
    #[arg(long)]
    chat: bool,

    /// 阻塞调用，一次性输出完整结果
    #[arg(long)]
    blocking: bool,

    #[arg(short, long)]
    verbose: bool,

    /// 配置文件路径（默认 ~/.openai-streaming/config.yaml）
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    model: Option<String>,

    #[arg(required = true, trailing_var_arg = true)]
    prompt: Vec<String>,
}

/// 逐个修订打印新增的文本，直到进入终止状态
async fn print_stream<V>(mut handle: StreamingCompletion<V>) -> anyhow::Result<()>
where
    V: AccumulatedValue,
{
    let mut printed = 0;
    let mut stdout = std::io::stdout();

    while let Some(state) = handle.changed().await {
        let text = state.text();
        if text.len() > printed {
            write!(stdout, "{}", &text[printed..])?;
            stdout.flush()?;
            printed = text.len();
        }

        match state.status {
            CompletionStatus::Loading => continue,
            CompletionStatus::Complete => {
                writeln!(stdout)?;
                if let Some(metrics) = &state.metrics {
                    tracing::info!("{}", metrics.summary());
                }
                return Ok(());
            }
            CompletionStatus::Error => {
                writeln!(stdout)?;
                match state.error {
                    Some(err) => bail!("流式补全失败: {}", err),
                    None => bail!("流式补全失败"),
                }
            }
        }
    }

    bail!("流式补全在终止前被中断")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    let prompt = args.prompt.join(" ");

    let config = ClientConfig::resolve(args.config.as_deref()).context("加载配置失败")?;
    let client = OpenAIClient::new(config).context("创建客户端失败")?;

    if args.chat {
        let mut request = ChatCompletionRequest::new(vec![ChatMessage::user(prompt)]);
        if let Some(model) = args.model {
            request = request.with_model(model);
        }

        if args.blocking {
            let message = client.complete_chat(&request).await?;
            println!("[{}] {}", message.role.as_str(), message.content);
            return Ok(());
        }
        print_stream(client.complete_chat_streaming(&request)).await
    } else {
        let mut request = CompletionRequest::new(prompt);
        if let Some(model) = args.model {
            request = request.with_model(model);
        }

        if args.blocking {
            println!("{}", client.complete(&request).await?);
            return Ok(());
        }
        print_stream(client.complete_streaming(&request)).await
    }
}
