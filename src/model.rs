// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/model.rs - 分类模型接口
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

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "http_classifier")]
mod http_classifier;
#[cfg(feature = "http_classifier")]
pub use self::http_classifier::HttpClassifier;

/// 分类服务的失败分类
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
  #[error("鉴权失败，请检查 API 密钥")]
  Unauthorized,
  #[error("找不到分类模型: {0}")]
  ModelNotFound(String),
  #[error("服务器内部错误 (HTTP {0})")]
  Server(u16),
  #[error("网络连接失败: {0}")]
  Connectivity(String),
  #[error("分类失败: {0}")]
  Other(String),
}

/// 单次分类请求的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyOptions {
  /// 候选模型 ID
  pub classifier_ids: Vec<String>,
  /// 服务端过滤阈值
  pub threshold: f32,
}

impl Default for ClassifyOptions {
  fn default() -> Self {
    Self {
      classifier_ids: Vec::new(),
      threshold: 0.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
  pub class_name: String,
  pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
  pub classifier_id: String,
  pub classes: Vec<ClassScore>,
}

#[async_trait]
pub trait Classifier: Send + Sync + 'static {
  async fn classify(
    &self,
    image: &RgbImage,
    options: &ClassifyOptions,
  ) -> Result<Vec<ClassifierResult>, ClassifierError>;
}

/// 取第一个模型结果中目标类别的置信度（大小写不敏感的精确匹配）
pub fn target_confidence(results: &[ClassifierResult], target_class: &str) -> Option<f32> {
  let target = target_class.to_uppercase();
  results
    .first()?
    .classes
    .iter()
    .find(|class| class.class_name.to_uppercase() == target)?
    .score
}
