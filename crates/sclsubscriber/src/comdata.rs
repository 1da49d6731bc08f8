use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/***************************************/
/*订阅引擎配置     */
/***************************************/
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EngineCfg {
    /*订阅动作的标题     */
    #[serde(default = "default_connect_title")]
    pub connect_title: String,
    /*取消订阅动作的标题     */
    #[serde(default = "default_disconnect_title")]
    pub disconnect_title: String,
    /*订阅时是否同时建立 LGOS/LSVS 监视     */
    #[serde(default = "default_instantiate_supervision")]
    pub instantiate_supervision: bool,
    /*新建监视 LN 允许的最大 inst     */
    #[serde(default = "default_max_supervision_inst")]
    pub max_supervision_inst: u32,
    /*工具新建 LN 的 Private type, 有这个标记的监视 LN 才会被整个删除     */
    #[serde(default = "default_created_marker")]
    pub created_marker: String,
}
fn default_connect_title() -> String {
    String::from("Connect")
}
fn default_disconnect_title() -> String {
    String::from("Disconnect")
}
fn default_instantiate_supervision() -> bool {
    true
}
fn default_max_supervision_inst() -> u32 {
    99
}
fn default_created_marker() -> String {
    String::from("OpenSCD.create")
}

impl Default for EngineCfg {
    fn default() -> Self {
        EngineCfg {
            connect_title: default_connect_title(),
            disconnect_title: default_disconnect_title(),
            instantiate_supervision: default_instantiate_supervision(),
            max_supervision_inst: default_max_supervision_inst(),
            created_marker: default_created_marker(),
        }
    }
}

impl EngineCfg {
    pub async fn read_cfg_file(cfg_file_name: impl AsRef<Path>) -> crate::Result<Self> {
        let cfg_file_name = cfg_file_name.as_ref();
        let content = fs::read_to_string(cfg_file_name)
            .await
            .with_context(|| format!("read engine cfg {}", cfg_file_name.display()))?;

        let res: EngineCfg = serde_json::from_str(&content).context("parse engine cfg errr")?;
        Ok(res)
    }
}
