//! 流程结果结构
//!
//! 一个站点一份 `SequenceRun`，每个步骤一份 `StepResult`。
//! `success=true, verified=false` 是一个独立的弱结果：动作自称成功但
//! 页面侧没能核实，下游步骤要按保守方式对待。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// 流程步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Register,
    Login,
    AddBank,
    CheckPromo,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Register => "注册",
            Stage::Login => "登录",
            Stage::AddBank => "加银行卡",
            Stage::CheckPromo => "领取优惠",
        };
        write!(f, "{}", name)
    }
}

/// 单个步骤的结果
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub stage: Stage,
    pub success: bool,
    /// 是否经过页面侧独立核实（不是只看动作自己的回包）
    pub verified: bool,
    pub skipped: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl StepResult {
    pub fn succeeded(stage: Stage, verified: bool, message: impl Into<String>) -> Self {
        Self {
            stage,
            success: true,
            verified,
            skipped: false,
            message: Some(message.into()),
            error: None,
            timestamp: Local::now(),
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            stage,
            success: false,
            verified: false,
            skipped: false,
            message: None,
            error: Some(error.into()),
            timestamp: Local::now(),
        }
    }

    pub fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            success: false,
            verified: false,
            skipped: true,
            message: Some(reason.into()),
            error: None,
            timestamp: Local::now(),
        }
    }

    /// 功能性跳过：该步骤对这次运行不适用（整体未启用 / 资料未提供），
    /// 不拦下游、不降级整体状态。reason 必须以 "未启用" 开头。
    pub fn not_applicable(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            success: true,
            verified: false,
            skipped: true,
            message: Some(reason.into()),
            error: None,
            timestamp: Local::now(),
        }
    }

    /// 步骤是否实际执行过并且拿到了结果（不含跳过）
    pub fn attempted(&self) -> bool {
        !self.skipped
    }
}

/// 整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Pending,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequenceStatus::Pending => "待执行",
            SequenceStatus::Running => "执行中",
            SequenceStatus::Succeeded => "成功",
            SequenceStatus::PartiallyFailed => "部分成功",
            SequenceStatus::Failed => "失败",
        };
        write!(f, "{}", name)
    }
}

/// 一个站点的完整流程结果
#[derive(Debug, Clone, Serialize)]
pub struct SequenceRun {
    pub site_name: String,
    pub register: StepResult,
    pub login: StepResult,
    pub add_bank: StepResult,
    pub check_promo: StepResult,
    pub status: SequenceStatus,
    /// 标签页被用户关掉导致的终止（独立标记，方便上游对账）
    pub tab_closed: bool,
}

impl SequenceRun {
    /// 初始状态：全部步骤标记为"未执行到"
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            register: StepResult::skipped(Stage::Register, "未执行"),
            login: StepResult::skipped(Stage::Login, "未执行"),
            add_bank: StepResult::skipped(Stage::AddBank, "未执行"),
            check_promo: StepResult::skipped(Stage::CheckPromo, "未执行"),
            status: SequenceStatus::Pending,
            tab_closed: false,
        }
    }

    /// 把下游所有还没执行的步骤标记为跳过
    pub fn skip_downstream_of(&mut self, stage: Stage, reason: &str) {
        let stages_after: &[Stage] = match stage {
            Stage::Register => &[Stage::Login, Stage::AddBank, Stage::CheckPromo],
            Stage::Login => &[Stage::AddBank, Stage::CheckPromo],
            Stage::AddBank => &[Stage::CheckPromo],
            Stage::CheckPromo => &[],
        };
        for s in stages_after {
            *self.step_mut(*s) = StepResult::skipped(*s, reason);
        }
    }

    pub fn step(&self, stage: Stage) -> &StepResult {
        match stage {
            Stage::Register => &self.register,
            Stage::Login => &self.login,
            Stage::AddBank => &self.add_bank,
            Stage::CheckPromo => &self.check_promo,
        }
    }

    pub fn step_mut(&mut self, stage: Stage) -> &mut StepResult {
        match stage {
            Stage::Register => &mut self.register,
            Stage::Login => &mut self.login,
            Stage::AddBank => &mut self.add_bank,
            Stage::CheckPromo => &mut self.check_promo,
        }
    }

    /// 根据各步骤结果推出终态
    ///
    /// - 注册/登录失败或标签页被关 → 整体失败
    /// - 所有执行过的步骤都成功且核实 → 成功
    /// - 其余情况（弱成功、下游失败、被策略跳过）→ 部分成功
    pub fn finalize(&mut self) {
        if self.tab_closed
            || (self.register.attempted() && !self.register.success)
            || (self.login.attempted() && !self.login.success)
        {
            self.status = SequenceStatus::Failed;
            return;
        }
        if !self.register.attempted() {
            // 一步都没跑起来
            self.status = SequenceStatus::Failed;
            return;
        }

        let steps = [&self.register, &self.login, &self.add_bank, &self.check_promo];
        let all_clean = steps
            .iter()
            .filter(|s| s.attempted())
            .all(|s| s.success && s.verified);
        let any_weak_or_failed = steps
            .iter()
            .any(|s| (s.attempted() && (!s.success || !s.verified)) || (s.skipped && s.stage != Stage::Register));

        // 跳过的步骤里只有"策略性跳过"会降级；这里区分不了动机，
        // 约定 message 以 "未启用" 开头的跳过不降级（功能整体关闭）。
        let benign_skip = |s: &&StepResult| {
            s.skipped
                && s.message
                    .as_deref()
                    .map(|m| m.starts_with("未启用"))
                    .unwrap_or(false)
        };
        let degrading_skip = steps
            .iter()
            .any(|s| s.skipped && !benign_skip(s) && s.stage != Stage::Register);

        if all_clean && !degrading_skip {
            self.status = SequenceStatus::Succeeded;
        } else if any_weak_or_failed || degrading_skip {
            self.status = SequenceStatus::PartiallyFailed;
        } else {
            self.status = SequenceStatus::Succeeded;
        }
    }
}

/// 进度事件（只向外发，不读回）
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub label: String,
}
