// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, SaliencyOverlay},
  scan::ConfidenceGrid,
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct OverlayRecord<'a> {
  target_class: &'a str,
  baseline: f32,
  blend_weight: f32,
  classified: usize,
  grid: &'a ConfidenceGrid,
}

/// 按日期分目录保存叠加图
///
/// `folder:///data/saliency?record&always`：`record` 额外写出 JSON 记录，
/// `always` 时即使没有任何有效遮挡位置也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_file_path(uri), record, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, record: bool, always: bool) -> Self {
    Self {
      directory: directory.into(),
      record,
      always,
      frame_counter: AtomicU16::new(0),
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    &self,
    path: &Path,
    overlay: &SaliencyOverlay,
  ) -> Result<(), DirectoryRecordOutputError> {
    let record = OverlayRecord {
      target_class: overlay.scan.target_class(),
      baseline: overlay.scan.baseline(),
      blend_weight: overlay.blend_weight,
      classified: overlay.scan.classified(),
      grid: overlay.scan.grid(),
    };
    std::fs::write(
      path.with_extension("json"),
      serde_json::to_string_pretty(&record)?,
    )?;
    Ok(())
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, overlay: &SaliencyOverlay) -> Result<(), Self::Error> {
    if !self.always && overlay.scan.classified() == 0 {
      debug!("没有有效遮挡位置，跳过保存");
      return Ok(());
    }

    let path = self.frame_path()?;
    overlay.image.save(&path)?;
    if self.record {
      self.write_record(&path, overlay)?;
    }
    info!("保存叠加图: {}", path.display());
    Ok(())
  }
}
