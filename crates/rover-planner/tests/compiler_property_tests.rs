//! 命令编译器的属性测试
//!
//! 用与航位推算相同的运动模型随机生成位姿序列，验证：
//! - 编译结果重放后回到最终位姿
//! - 行程压缩不超过上限
//! - 分段序号连续

use proptest::prelude::*;
use rover_planner::{CompilerConfig, Pose, compile, dead_reckon, segment};
use rover_protocol::{Heading, Obstacle, OrientedState, PrimitiveCommand};

#[derive(Debug, Clone, Copy)]
enum Action {
    Forward,
    Backward,
    /// 航向差（1/2/6/7）+ 是否前进
    Turn(i32, bool),
    UTurn,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => Just(Action::Forward),
        2 => Just(Action::Backward),
        3 => (prop::sample::select(vec![1, 2, 6, 7]), any::<bool>())
            .prop_map(|(steps, forward)| Action::Turn(steps, forward)),
        1 => Just(Action::UTurn),
    ]
}

fn add((x, y): (i32, i32), (dx, dy): (i32, i32), sign: i32) -> (i32, i32) {
    (x + dx * sign, y + dy * sign)
}

/// 生成位姿序列；`snapshots[i]` 为真时在第 i 个新位姿上拍摄
fn build_states(
    start: (i32, i32, u8),
    actions: &[Action],
    snapshots: &[bool],
) -> (Vec<OrientedState>, Vec<Obstacle>) {
    let heading = Heading::from_code(start.2).unwrap();
    let mut states = vec![OrientedState::new(start.0, start.1, heading)];
    let mut obstacles = Vec::new();

    for (i, action) in actions.iter().enumerate() {
        let prev = *states.last().unwrap();
        let pos = (prev.x, prev.y);
        let (pos, heading) = match *action {
            Action::Forward => (add(pos, prev.heading.unit(), 1), prev.heading),
            Action::Backward => (add(pos, prev.heading.unit(), -1), prev.heading),
            Action::Turn(steps, forward) => {
                let h = prev.heading.rotate(steps);
                (add(pos, h.unit(), if forward { 1 } else { -1 }), h)
            },
            Action::UTurn => {
                let mid = prev.heading.rotate(2);
                let h = prev.heading.rotate(4);
                (add(add(pos, mid.unit(), 1), h.unit(), 1), h)
            },
        };
        let mut state = OrientedState::new(pos.0, pos.1, heading);
        if snapshots.get(i).copied().unwrap_or(false) {
            let id = obstacles.len() as u32 + 1;
            obstacles.push(Obstacle::new(id, pos.0 + 3, pos.1, Heading::West));
            state = state.with_snapshot(id);
        }
        states.push(state);
    }

    (states, obstacles)
}

fn config_strategy() -> impl Strategy<Value = CompilerConfig> {
    (10u32..=250).prop_map(|cap| CompilerConfig {
        max_move_distance: cap,
        ..CompilerConfig::default()
    })
}

proptest! {
    /// 编译结果重放后与最终位姿一致
    #[test]
    fn compiled_route_replays_to_final_state(
        start in (-20i32..20, -20i32..20, 0u8..8),
        actions in prop::collection::vec(action_strategy(), 1..40),
        config in config_strategy(),
    ) {
        let (states, obstacles) = build_states(start, &actions, &[]);
        let route = compile(&states, &obstacles, &config).unwrap();
        let last = states.last().unwrap();
        let pose = dead_reckon(Pose::from(&states[0]), &route.commands, &config);
        prop_assert_eq!(pose, Pose::from(last));
    }

    /// 行程压缩不超过上限，且相邻同向 Move 无法再合并
    #[test]
    fn compression_respects_cap(
        actions in prop::collection::vec(action_strategy(), 1..60),
        config in config_strategy(),
    ) {
        let (states, obstacles) = build_states((0, 0, 0), &actions, &[]);
        let route = compile(&states, &obstacles, &config).unwrap();
        prop_assert_eq!(route.commands.len(), route.durations.len());
        prop_assert_eq!(route.commands.last(), Some(&PrimitiveCommand::Stop));

        for pair in route.commands.windows(2) {
            if let (
                PrimitiveCommand::Move { sense: a, distance: da },
                PrimitiveCommand::Move { sense: b, distance: db },
            ) = (pair[0], pair[1])
            {
                prop_assert!(a != b || da + db > config.max_move_distance);
            }
        }
        for cmd in &route.commands {
            if let PrimitiveCommand::Move { distance, .. } = cmd {
                prop_assert!(*distance <= config.max_move_distance);
                prop_assert!(*distance > 0);
            }
        }
    }

    /// 分段数 = 拍摄数 + 1，电机序号从 1 连续递增
    #[test]
    fn segments_follow_snapshots(
        actions in prop::collection::vec(action_strategy(), 1..30),
        snapshots in prop::collection::vec(any::<bool>(), 30),
    ) {
        let config = CompilerConfig::default();
        let (states, obstacles) = build_states((0, 0, 2), &actions, &snapshots);
        let route = compile(&states, &obstacles, &config).unwrap();
        let plan = segment(&route);

        prop_assert_eq!(plan.len(), obstacles.len() + 1);
        let expected_order: Vec<Option<u32>> = obstacles
            .iter()
            .map(|ob| Some(ob.id))
            .chain(std::iter::once(None))
            .collect();
        prop_assert_eq!(plan.obstacle_order(), expected_order);

        let seqs: Vec<u32> = plan
            .segments
            .iter()
            .flat_map(|s| s.commands.iter().map(|c| c.seq))
            .collect();
        let expected: Vec<u32> = (1..=seqs.len() as u32).collect();
        prop_assert_eq!(seqs, expected);
        prop_assert!((plan.total_secs() - route.total_duration()).abs() < 1e-6);
    }
}

#[test]
fn scenario_straight_then_right_turn() {
    let states = [
        OrientedState::new(0, 0, Heading::North),
        OrientedState::new(0, 1, Heading::North),
        OrientedState::new(1, 2, Heading::NorthEast),
    ];
    let route = compile(&states, &[], &CompilerConfig::default()).unwrap();
    let rendered: Vec<String> = route.commands.iter().map(|c| c.to_string()).collect();
    assert_eq!(rendered, vec!["Move(Forward, 10)", "Turn(Right, 45, Forward)", "Stop"]);
}
