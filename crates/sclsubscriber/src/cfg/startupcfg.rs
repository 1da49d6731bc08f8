use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/***************************************/
/***********   功能记录      Start ******************/
/***************************************/
/*1 命令里的元素都用 identity 字符串定位, 见 scl::identity     */
/*2 命令按顺序执行, 每条命令的动作应用后再执行下一条     */
/***************************************/
/***********  功能记录        End ******************/
/***************************************/

// 用来读取启动配置的文件相关

/// One batch step, elements addressed by identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SubscriptionCmd {
    Subscribe {
        ext_ref: String,
        control: String,
        fcda: String,
    },
    Unsubscribe {
        ext_ref: String,
    },
    SubscribeIed {
        control: String,
        ied: String,
    },
    UnsubscribeIed {
        control: String,
        ied: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartupCfg {
    pub scl_filename: String,
    /*不给就用默认引擎配置     */
    #[serde(default)]
    pub engine_cfg_filename: Option<String>,
    /*报告里列出的控制块类型 GSEControl / SampledValueControl ...     */
    #[serde(default = "default_control_tag")]
    pub control_tag: String,
    #[serde(default)]
    pub commands: Vec<SubscriptionCmd>,
    /*修改后的 SCL 写到哪里, 不给就不写     */
    #[serde(default)]
    pub output_filename: Option<String>,
}
fn default_control_tag() -> String {
    String::from("GSEControl")
}

pub async fn read_startup_cfg_file(cfg_file_name: impl AsRef<Path>) -> crate::Result<StartupCfg> {
    let cfg_file_name = cfg_file_name.as_ref();
    let content = fs::read_to_string(cfg_file_name)
        .await
        .with_context(|| format!("read startup cfg {}", cfg_file_name.display()))?;

    let res: StartupCfg = serde_json::from_str(&content).context("parse startup cfg errr")?;
    Ok(res)
}
