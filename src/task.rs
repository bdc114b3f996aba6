// 该文件是 Zheyan （遮掩） 项目的一部分。
// src/task.rs - 分析任务
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

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::{
  frame::SquareFrame,
  model::Classifier,
  output::Render,
  session::{Session, SessionError},
};

#[allow(async_fn_in_trait)]
pub trait Task<I, S, O>: Sized {
  type Error;
  async fn run_task(self, input: I, session: S, output: O) -> Result<(), Self::Error>;
}

/// 取第一帧扫描一次并输出
pub struct OneShotTask {
  target_class: String,
  blend_weight: f32,
}

impl OneShotTask {
  pub fn new(target_class: impl Into<String>, blend_weight: f32) -> Self {
    Self {
      target_class: target_class.into(),
      blend_weight,
    }
  }
}

async fn scan_first_frame<const N: u32, I, C, O>(
  mut input: I,
  session: &mut Session<C, N>,
  output: &O,
  target_class: &str,
  blend_weight: f32,
) -> anyhow::Result<()>
where
  I: Iterator<Item = SquareFrame<N>>,
  C: Classifier,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
  info!("输入帧获取成功，开始分析...");
  let now = std::time::Instant::now();
  let overlay = session.classify(frame, target_class, blend_weight).await?;
  info!(
    "分析完成，耗时: {:.2?}, 类别 {} 置信度: {:.4}",
    now.elapsed(),
    target_class,
    overlay.scan.baseline()
  );
  output.render_result(&overlay)?;
  Ok(())
}

impl<'s, const N: u32, I, C, O> Task<I, &'s mut Session<C, N>, O> for OneShotTask
where
  I: Iterator<Item = SquareFrame<N>>,
  C: Classifier,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    input: I,
    session: &'s mut Session<C, N>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    scan_first_frame(input, session, &output, &self.target_class, self.blend_weight).await?;
    info!("任务完成，退出");
    Ok(())
  }
}

/// 扫描一次后，从输入流逐行读取新的混合权重并重新渲染
///
/// 空行忽略，`q` 或 EOF 结束。
pub struct InteractiveTask<R> {
  target_class: String,
  blend_weight: f32,
  reader: R,
}

impl<R> InteractiveTask<R> {
  pub fn new(target_class: impl Into<String>, blend_weight: f32, reader: R) -> Self {
    Self {
      target_class: target_class.into(),
      blend_weight,
      reader,
    }
  }
}

impl<'s, const N: u32, I, C, O, R> Task<I, &'s mut Session<C, N>, O> for InteractiveTask<R>
where
  I: Iterator<Item = SquareFrame<N>>,
  C: Classifier,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
  R: AsyncBufRead + Unpin,
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    input: I,
    session: &'s mut Session<C, N>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始交互任务...");
    scan_first_frame(input, session, &output, &self.target_class, self.blend_weight).await?;
    info!("输入 0 到 1 之间的混合权重以重新渲染，输入 q 退出");

    let mut lines = self.reader.lines();
    while let Some(line) = lines.next_line().await? {
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      if line.eq_ignore_ascii_case("q") {
        break;
      }

      let Ok(blend_weight) = line.parse::<f32>() else {
        warn!("无法解析混合权重: {}", line);
        continue;
      };
      match session.set_blend_weight(blend_weight).await {
        Ok(overlay) => output.render_result(&overlay)?,
        Err(SessionError::InvalidBlendWeight(w)) => warn!("混合权重超出范围: {}", w),
        Err(e) => return Err(e.into()),
      }
    }

    info!("交互任务结束");
    Ok(())
  }
}
