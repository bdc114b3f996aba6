// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/session.rs - 分析会话状态机
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::SquareFrame,
  model::Classifier,
  output::{DrawError, SaliencyOverlay, SaliencyRenderer},
  scan::{OcclusionScanner, ScanError, ScanResult},
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("扫描失败: {0}")]
  Scan(#[from] ScanError),
  #[error("渲染失败: {0}")]
  Draw(#[from] DrawError),
  #[error("渲染任务异常: {0}")]
  Join(#[from] tokio::task::JoinError),
  #[error("尚未完成扫描")]
  NotScanned,
  #[error("混合权重必须在 [0, 1] 内, 实际为 {0}")]
  InvalidBlendWeight(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
  Idle,
  Scanning,
  Rendered { blend_weight: f32 },
}

struct Scanned<const N: u32> {
  frame: Arc<SquareFrame<N>>,
  scan: Arc<ScanResult>,
}

/// 扫描期间保持 `Scanning`，结束、失败或被取消时回到 `Idle`
struct ScanningGuard<'a> {
  state: &'a mut SessionState,
}

impl<'a> ScanningGuard<'a> {
  fn enter(state: &'a mut SessionState) -> Self {
    *state = SessionState::Scanning;
    Self { state }
  }
}

impl Drop for ScanningGuard<'_> {
  fn drop(&mut self) {
    if *self.state == SessionState::Scanning {
      *self.state = SessionState::Idle;
    }
  }
}

/// 一次分析会话
///
/// `classify` 丢弃旧结果并重新扫描；`set_blend_weight` 只基于已保存的扫描结果重新渲染。
pub struct Session<C, const N: u32> {
  scanner: OcclusionScanner<C>,
  renderer: SaliencyRenderer,
  state: SessionState,
  scanned: Option<Scanned<N>>,
}

fn check_blend_weight(blend_weight: f32) -> Result<f32, SessionError> {
  if (0.0..=1.0).contains(&blend_weight) {
    Ok(blend_weight)
  } else {
    Err(SessionError::InvalidBlendWeight(blend_weight))
  }
}

impl<C: Classifier, const N: u32> Session<C, N> {
  pub fn new(scanner: OcclusionScanner<C>, renderer: SaliencyRenderer) -> Self {
    Self {
      scanner,
      renderer,
      state: SessionState::Idle,
      scanned: None,
    }
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn scan_result(&self) -> Option<&Arc<ScanResult>> {
    self.scanned.as_ref().map(|s| &s.scan)
  }

  pub fn scanner(&self) -> &OcclusionScanner<C> {
    &self.scanner
  }

  /// 扫描新图像并以给定权重渲染
  pub async fn classify(
    &mut self,
    frame: SquareFrame<N>,
    target_class: &str,
    blend_weight: f32,
  ) -> Result<SaliencyOverlay, SessionError> {
    let blend_weight = check_blend_weight(blend_weight)?;
    self.reset();

    let scan = {
      let _scanning = ScanningGuard::enter(&mut self.state);
      self.scanner.scan(&frame, target_class).await?
    };

    self.scanned = Some(Scanned {
      frame: Arc::new(frame),
      scan: Arc::new(scan),
    });
    self.render(blend_weight).await
  }

  /// 只改变混合权重，不重新分类
  pub async fn set_blend_weight(
    &mut self,
    blend_weight: f32,
  ) -> Result<SaliencyOverlay, SessionError> {
    let blend_weight = check_blend_weight(blend_weight)?;
    self.render(blend_weight).await
  }

  pub fn reset(&mut self) {
    if self.scanned.take().is_some() {
      debug!("丢弃上一次扫描结果");
    }
    self.state = SessionState::Idle;
  }

  async fn render(&mut self, blend_weight: f32) -> Result<SaliencyOverlay, SessionError> {
    let scanned = self.scanned.as_ref().ok_or(SessionError::NotScanned)?;
    let frame = Arc::clone(&scanned.frame);
    let scan = Arc::clone(&scanned.scan);
    let renderer = self.renderer;

    let now = std::time::Instant::now();
    let image = {
      let scan = Arc::clone(&scan);
      tokio::task::spawn_blocking(move || renderer.render(&frame, &scan, blend_weight)).await??
    };
    info!("叠加层渲染完成 (权重 {:.2})，耗时: {:.2?}", blend_weight, now.elapsed());

    self.state = SessionState::Rendered { blend_weight };
    Ok(SaliencyOverlay {
      image,
      blend_weight,
      scan,
    })
  }
}
