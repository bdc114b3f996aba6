// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;

use clap::Parser;
use url::Url;

use zheyan::{
  model::ClassifyOptions,
  output::{OverlayMode, RenderConfig},
  scan::{ScanGeometry, ScannerConfig},
};

fn parse_unit(s: &str) -> Result<f32, String> {
  let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("{} 不在 [0, 1] 内", value))
  }
}

/// Zheyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类服务地址（http/https，可带 api_key、timeout_ms 查询参数）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径
  /// 支持格式:
  /// - 图片: image:///path/out.png（路径中的 {blend} 会替换为混合权重）
  /// - 目录: folder:///path/dir?record&always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 目标类别名（大小写不敏感）
  #[arg(long = "class", default_value = "USB", value_name = "CLASS")]
  pub target_class: String,

  /// 叠加层混合权重 (0.0 - 1.0)
  #[arg(long, default_value = "1.0", value_parser = parse_unit, value_name = "WEIGHT")]
  pub blend: f32,

  /// 置信度下降的放大倍数
  #[arg(long, default_value = "5.0", value_name = "FACTOR")]
  pub sensitivity: f32,

  /// 叠加模式: darken 或 spotlight
  #[arg(long, default_value = "darken", value_name = "MODE")]
  pub overlay: OverlayMode,

  /// 分类服务的置信度阈值
  #[arg(long, default_value = "0.0", value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 候选模型 ID，可重复
  #[arg(long = "classifier-id", value_name = "ID")]
  pub classifier_ids: Vec<String>,

  /// 单次分类超时（毫秒）
  #[arg(long, default_value = "30000", value_name = "MILLIS")]
  pub timeout_ms: u64,

  /// 滑窗步长（像素）
  #[arg(long, default_value = "16", value_name = "PIXELS")]
  pub step: u32,

  /// 遮挡窗口边长（像素）
  #[arg(long, default_value = "64", value_name = "PIXELS")]
  pub window: u32,

  /// 分类服务 API 密钥
  #[arg(long, env = "ZHEYAN_API_KEY", hide_env_values = true)]
  pub api_key: Option<String>,

  /// 扫描后从标准输入读取新的混合权重并重新渲染
  #[arg(long)]
  pub interactive: bool,
}

impl Args {
  pub fn scanner_config(&self) -> ScannerConfig {
    ScannerConfig::default()
      .with_geometry(ScanGeometry {
        step: self.step,
        window: self.window,
      })
      .with_timeout(Duration::from_millis(self.timeout_ms))
      .with_options(ClassifyOptions {
        classifier_ids: self.classifier_ids.clone(),
        threshold: self.threshold,
      })
  }

  pub fn render_config(&self) -> RenderConfig {
    RenderConfig {
      sensitivity: self.sensitivity,
      mode: self.overlay,
    }
  }
}
