//! gghub ヘッドレスランナー
//!
//! 配信ビューアのコアを起動する: プレイバック監視→セッション管理→
//! チャット＋分析。描画チェーンを持たない環境でも状態遷移とログで
//! 動作を確認できる。

use clap::Parser;
use gghub::{
    config::{AppConfig, ConfigManager},
    utils, App, GghubResult, PlaybackMonitor,
};

/// GlobalGaming live stream viewer core
#[derive(Debug, Parser)]
#[command(name = "gghub", version, about)]
struct Args {
    /// プレイバックURL（HLSマニフェスト）
    #[arg(long)]
    url: Option<String>,

    /// 配信識別子（省略時はURLから抽出）
    #[arg(long)]
    stream_id: Option<String>,

    /// 設定ファイルのパス（省略時はXDG設定ディレクトリ）
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// デモトラフィック生成を無効化
    #[arg(long)]
    no_demo: bool,
}

#[tokio::main]
async fn main() -> GghubResult<()> {
    let args = Args::parse();

    // 設定読み込み（ログ初期化前なのでエラーは標準エラーへ）
    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.load_config().unwrap_or_else(|e| {
        eprintln!("設定読み込みエラー、デフォルト設定を使用: {}", e);
        AppConfig::default()
    });

    config.apply_env_overrides();
    if let Some(url) = args.url {
        config.stream.playback_url = url;
    }
    if let Some(stream_id) = args.stream_id {
        config.stream.stream_id = stream_id;
    }
    if args.no_demo {
        config.chat.demo_traffic = false;
    }

    // 強化されたログ初期化（guardはプロセス終了まで保持）
    let _log_guard = utils::init_logging(&config.log)?;

    tracing::info!("🎬 Starting gghub - GlobalGaming Live Stream Viewer");

    if !utils::validate_playback_url(&config.stream.playback_url) {
        tracing::warn!(
            "⚠️ Playback URL does not look like an HLS manifest: {}",
            config.stream.playback_url
        );
    }

    // サービス一式を構築
    let mut app = App::new(config.clone())?;
    tracing::info!("📡 Stream ID: {}", app.stream_id());

    // プレイバック監視を起動
    let monitor = PlaybackMonitor::new(&config.stream)?;
    let (status_rx, _player_handle, monitor_shutdown) = monitor.spawn();

    // Ctrl+Cシグナルハンドラー
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        tracing::info!("🛑 終了シグナルを受信しました");
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| {
        gghub::AppError::Configuration(format!("Failed to set signal handler: {}", e))
    })?;

    // メインループ
    app.run(status_rx, shutdown_rx).await?;

    // プレイバック監視を停止
    let _ = monitor_shutdown.send(());

    tracing::info!("👋 gghub shutting down");
    Ok(())
}
