//! 外部路径规划器抽象
//!
//! 路径搜索本身不在本 crate 内实现；规划器只需根据障碍物集合
//! 给出有序位姿序列，随后由 [`plan_route`] 完成编译与分段。

use crate::compiler::{CompiledRoute, CompilerConfig, compile};
use crate::error::{PlanError, PlannerError};
use crate::segment::SegmentPlan;
use rover_protocol::{Obstacle, OrientedState};
use tracing::info;

/// 路径规划器
pub trait RoutePlanner: Send {
    /// 根据障碍物集合生成位姿序列（需在相应位姿上标注拍摄目标）
    fn plan(&mut self, obstacles: &[Obstacle]) -> Result<Vec<OrientedState>, PlannerError>;
}

impl<F> RoutePlanner for F
where
    F: FnMut(&[Obstacle]) -> Result<Vec<OrientedState>, PlannerError> + Send,
{
    fn plan(&mut self, obstacles: &[Obstacle]) -> Result<Vec<OrientedState>, PlannerError> {
        self(obstacles)
    }
}

/// 回放固定位姿序列的规划器
#[derive(Debug, Clone, Default)]
pub struct StaticRoute {
    states: Vec<OrientedState>,
}

impl StaticRoute {
    pub fn new(states: Vec<OrientedState>) -> Self {
        Self { states }
    }

    pub fn states(&self) -> &[OrientedState] {
        &self.states
    }
}

impl RoutePlanner for StaticRoute {
    fn plan(&mut self, _obstacles: &[Obstacle]) -> Result<Vec<OrientedState>, PlannerError> {
        if self.states.is_empty() {
            return Err(PlannerError::new("static route is empty"));
        }
        Ok(self.states.clone())
    }
}

/// 规划 + 编译 + 分段的完整结果
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannedRoute {
    pub states: Vec<OrientedState>,
    pub route: CompiledRoute,
    pub plan: SegmentPlan,
}

/// 运行规划器并编译结果
pub fn plan_route(
    planner: &mut dyn RoutePlanner,
    obstacles: &[Obstacle],
    config: &CompilerConfig,
) -> Result<PlannedRoute, PlanError> {
    let states = planner.plan(obstacles)?;
    let route = compile(&states, obstacles, config)?;
    let plan = SegmentPlan::from_route(&route);
    info!(
        "Planned route: {} states, {} commands, {} segments, {} detection triggers",
        states.len(),
        route.len(),
        plan.len(),
        plan.trigger_count()
    );
    Ok(PlannedRoute {
        states,
        route,
        plan,
    })
}
