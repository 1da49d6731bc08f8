use anyhow::{bail, Context};
use sclsubscriber::cfg::startupcfg;
use sclsubscriber::comdata::EngineCfg;
use sclsubscriber::scl::SclDocument;
use sclsubscriber::subscription::{ChannelSink, ControlBlockKind, SubscriptionEngine};
use sclsubscriber::{batch, Result};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/***************************************/
/***********   常量区域      Start ******************/
/***************************************/
//主版本号
const MAIN_VERION: u32 = 0;
//次版本号
const SUB_VERION: u32 = 1;
//修改序号
const CHANGE_INDEX: u32 = 0;
//修改时间
const CHANGE_DATE: u32 = 261018;

/*初始配置文件路径     */
const CFG_FILE_NAME: &str = "startupcfg.json";

const CHANELENUM: usize = 128;
/***************************************/
/***********   常量区域      End ******************/
/***************************************/

#[tokio::main]
pub async fn main() -> Result<()> {
    println!(
        "Rust SCL subscriber ,version :{}.{}.{}_{}",
        MAIN_VERION, SUB_VERION, CHANGE_INDEX, CHANGE_DATE
    );
    println!(
        "RUN START SINCE {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg_file = std::env::args().nth(1).unwrap_or_else(|| CFG_FILE_NAME.to_string());
    let startup_cfg = startupcfg::read_startup_cfg_file(&cfg_file).await?;
    info!("startup cfg {:?}", startup_cfg);

    let engine_cfg = match &startup_cfg.engine_cfg_filename {
        Some(filename) => EngineCfg::read_cfg_file(filename).await?,
        None => EngineCfg::default(),
    };
    let kind = ControlBlockKind::from_tag(&startup_cfg.control_tag)
        .with_context(|| format!("unknown control block tag {}", startup_cfg.control_tag))?;

    let doc = SclDocument::load(&startup_cfg.scl_filename).await?;
    let mut engine = SubscriptionEngine::new(engine_cfg);
    println!("{}", batch::report(&doc, &mut engine, kind));

    /***************************************/
    /***********   动作应用任务      Start ******************/
    /***************************************/
    let shared_doc = Arc::new(Mutex::new(doc));
    let (mut sink, mut action_rx) = ChannelSink::new(CHANELENUM);
    let (applied_tx, mut applied_rx) = mpsc::channel::<bool>(CHANELENUM);

    let applier_doc = shared_doc.clone();
    let applier = tokio::spawn(async move {
        while let Some(action) = action_rx.recv().await {
            let res = applier_doc.lock().await.apply(&action);
            match &res {
                Ok(_) => info!("applied '{}', {} edits", action.title, action.edits.len()),
                Err(err) => error!("apply failed: {:#}", err),
            }
            if applied_tx.send(res.is_ok()).await.is_err() {
                break;
            }
        }
    });

    let mut events = sink.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!("event {}", serde_json::to_string(&event).unwrap_or_default()),
                Err(RecvError::Lagged(n)) => warn!("{} events skipped", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
    /***************************************/
    /***********   动作应用任务        End ******************/
    /***************************************/

    let mut applied: u64 = 0;
    for cmd in &startup_cfg.commands {
        {
            let doc = shared_doc.lock().await;
            batch::execute(cmd, &doc, &mut engine, &mut sink)?;
        }
        /*等这条命令的动作都应用完, 下一条命令要看到新的文档     */
        while applied < sink.dispatched() {
            match applied_rx.recv().await {
                Some(true) => applied += 1,
                Some(false) => bail!("command {:?} rejected by the document", cmd),
                None => bail!("applier stopped"),
            }
        }
    }
    drop(sink);
    applier.await?;

    let doc = shared_doc.lock().await;
    if !startup_cfg.commands.is_empty() {
        println!("{}", batch::report(&doc, &mut engine, kind));
    }
    if let Some(output_filename) = &startup_cfg.output_filename {
        tokio::fs::write(output_filename, doc.to_xml_string()?.as_bytes())
            .await
            .with_context(|| format!("write {}", output_filename))?;
        info!("written {}", output_filename);
    }
    Ok(())
}
