//! 命令行入口
//!
//! 对保存下来的聊天页面运行翻译器，可选地按间隔把 feed 文件中的行
//! 追加进聊天容器来模拟实时消息，结束后输出翻译后的文档。

use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

use chat_translator::env::{core::LogLevel, generate_env_docs, EnvVar};
use chat_translator::host::{
    control_channel, LiveDocument, MemoryBackend, PreferenceStore, Preferences, TomlFileBackend,
};
use chat_translator::parsers::html::dom::{append_child, create_element, create_text};
use chat_translator::translation::config::load_translator_config;
use chat_translator::translation::{
    ChatTranslator, ConfigManager, HttpTranslationProvider, TranslationResult, TranslatorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "chat-translator", version, about = "Translate chat messages in a live HTML page")]
struct Cli {
    /// HTML file to load
    #[arg(required_unless_present_any = ["env_docs", "write_config"])]
    input: Option<String>,

    /// Write the translated document here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Target language (skips the preference file)
    #[arg(short = 'l', long = "lang")]
    target_language: Option<String>,

    /// Translation endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<String>,

    /// File whose lines are appended to the chat as new messages
    #[arg(long)]
    feed: Option<String>,

    /// Delay between feed lines
    #[arg(long, default_value_t = 500)]
    feed_interval_ms: u64,

    /// How long to keep the translator running
    #[arg(long, default_value_t = 5000)]
    run_ms: u64,

    /// Input and output charset
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// Print the supported environment variables and exit
    #[arg(long)]
    env_docs: bool,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chat_translator={}", LogLevel::get_or_default("info".to_string())))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.env_docs {
        print!("{}", generate_env_docs());
        return Ok(());
    }
    if let Some(path) = &cli.write_config {
        ConfigManager::generate_example_config(path)?;
        eprintln!("Example configuration written to {}", path);
        return Ok(());
    }
    let Some(input_path) = &cli.input else {
        return Err("missing input file".into());
    };

    let mut config = load_config(&cli)?;
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    config.validate()?;

    let input = fs::read(input_path)?;
    let feed = match &cli.feed {
        Some(path) => fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    let output = local.block_on(&runtime, translate_page(&cli, &config, &input, feed))?;

    match &cli.output {
        Some(path) => fs::write(path, output)?,
        None => io::stdout().write_all(&output)?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> TranslationResult<TranslatorConfig> {
    match &cli.config {
        Some(path) => Ok(ConfigManager::from_file(path)?.into_config()),
        None => Ok(load_translator_config()),
    }
}

async fn translate_page(
    cli: &Cli,
    config: &TranslatorConfig,
    input: &[u8],
    feed: Vec<String>,
) -> TranslationResult<Vec<u8>> {
    let document = LiveDocument::parse(input, &cli.encoding);

    let preferences = match &cli.target_language {
        Some(language) => PreferenceStore::open(MemoryBackend::with_preferences(Preferences {
            target_language: language.clone(),
            ..Preferences::default()
        }))?,
        None => PreferenceStore::open(TomlFileBackend::new(config.preferences_path()))?,
    };
    tracing::info!("目标语言: {}", preferences.target_language());

    let provider = Rc::new(HttpTranslationProvider::new(config)?);
    let translator = ChatTranslator::new(document.clone(), Rc::new(preferences), provider, config)?;

    let (control, receiver) = control_channel();
    let service = tokio::task::spawn_local(translator.clone().run(receiver));

    let run_for = Duration::from_millis(cli.run_ms);
    let feeder = feed_lines(&translator, feed, Duration::from_millis(cli.feed_interval_ms));
    let _ = tokio::time::timeout(run_for, async {
        feeder.await;
        std::future::pending::<()>().await
    })
    .await;

    drop(control);
    match service.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!("翻译器任务异常结束: {}", e),
    }

    let stats = translator.stats();
    tracing::info!(
        "处理 {} 条, 翻译 {} 条, 缓存命中 {}, 服务调用 {}, 失败 {}",
        stats.engine.processed,
        stats.engine.translated,
        stats.engine.cache_hits,
        stats.engine.provider_calls,
        stats.engine.provider_errors
    );

    document.serialize(&cli.encoding)
}

/// 每隔 `interval` 把一行追加为一条新消息
async fn feed_lines(translator: &ChatTranslator, lines: Vec<String>, interval: Duration) {
    let document = translator.document();

    for line in lines {
        tokio::time::sleep(interval).await;

        let parent = translator
            .watcher()
            .container()
            .or_else(|| translator.engine().classifier().locate_container(document.document()))
            .or_else(|| document.body());
        let Some(parent) = parent else {
            tracing::warn!("文档中没有可追加消息的位置");
            return;
        };

        let row = create_element("div", &[("class", "chat-line__message")]);
        let text = create_element("span", &[("class", "text-fragment")]);
        append_child(&text, create_text(&line));
        append_child(&row, text);
        document.append_nodes(&parent, vec![row]);
    }
}
