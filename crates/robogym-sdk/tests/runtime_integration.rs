//! TaskRuntime 集成测试
//!
//! 使用 MockArticulation 驱动完整的初始化、reset 与控制周期流程。

mod common;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use approx::assert_relative_eq;
use common::*;
use robogym_articulation::MockCommand;
use robogym_sdk::prelude::*;
use robogym_types::MemorySink;

#[test]
fn test_homing_broadcast_and_unknown_joint() {
    let sink = Arc::new(MemorySink::new());
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), sink.clone()).unwrap();
    runtime
        .add_robot("centauro", mock_articulation(), SRDF)
        .unwrap();

    let homing = runtime.homing("centauro").unwrap().get_homing();
    assert_eq!(homing, &batch(2, 3, &[0.3, -0.6, 0.0, 0.3, -0.6, 0.0]));

    let unknown: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|(_, d)| matches!(d, Diagnostic::UnknownHomingJoint { joint, .. } if joint == "ankle"))
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].0, "homing");
}

#[test]
fn test_custom_homing_group() {
    let mut config = cpu_config(&["centauro"]);
    config.homing_group = "crouch".into();
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    runtime
        .add_robot("centauro", mock_articulation(), SRDF)
        .unwrap();

    let homing = runtime.homing("centauro").unwrap().get_homing();
    assert_eq!(homing.row_to_vec(0), vec![0.9, 0.0, 0.0]);
}

#[test]
fn test_add_robot_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SRDF.as_bytes()).unwrap();

    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    runtime
        .add_robot_from_file("centauro", mock_articulation(), file.path())
        .unwrap();
    assert!(runtime.is_complete());

    let missing = file.path().with_extension("srdf.missing");
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    assert!(matches!(
        runtime.add_robot_from_file("centauro", mock_articulation(), &missing),
        Err(RuntimeError::Homing(HomingError::Io { .. }))
    ));
}

#[test]
fn test_reset_tick_then_differentiated_velocity() {
    let dt = 0.01;
    let mut config = cpu_config(&["centauro"]);
    config.state_differentiation_dt = Some(dt);
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    // reset 周期：状态跳变，速度必须为零
    m.drive_joint_positions(batch(2, 3, &[0.5, 0.5, 0.5, -0.5, -0.5, -0.5]));
    runtime.reset().unwrap();
    let controller = runtime.controller("centauro").unwrap();
    assert!(controller.vel().is_all_zero());
    assert_eq!(controller.pos().row_to_vec(0), vec![0.5, 0.5, 0.5]);

    // 下一个周期：x_{t−1} 为 reset 周期的状态
    m.drive_joint_positions(batch(2, 3, &[0.51, 0.5, 0.48, -0.5, -0.5, -0.5]));
    runtime.refresh_states(false).unwrap();
    let controller = runtime.controller("centauro").unwrap();
    assert_relative_eq!(controller.vel()[(0, 0)], 1.0, epsilon = 1e-9);
    assert_relative_eq!(controller.vel()[(0, 2)], -2.0, epsilon = 1e-9);
    assert_relative_eq!(controller.vel()[(1, 0)], 0.0, epsilon = 1e-9);
}

#[test]
fn test_direct_velocity_source() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();
    assert_eq!(runtime.velocity_source(), VelocitySource::Direct);

    let v = batch(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    m.drive_joint_velocities(v.clone());
    runtime.reset().unwrap();
    assert_eq!(runtime.controller("centauro").unwrap().vel(), &v);
}

#[test]
fn test_selector_scoped_refs_leave_rest_unchanged() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    let controller = runtime.controller_mut("centauro").unwrap();
    let report = controller
        .set_refs(
            None,
            Some(&batch(1, 2, &[1.0, 2.0])),
            None,
            Some(&[1]),
            Some(&[0, 2]),
        )
        .unwrap();
    assert!(report.all_ok());
    m.take_commands();
    runtime.apply_cmds(false).unwrap();

    let controller = runtime.controller("centauro").unwrap();
    assert_eq!(controller.pos_ref().row_to_vec(0), vec![0.3, -0.6, 0.0]);
    assert_eq!(controller.pos_ref().row_to_vec(1), vec![1.0, -0.6, 2.0]);

    let commands = m.take_commands();
    assert_eq!(commands[0].kind(), "synchronize");
    match &commands[2] {
        MockCommand::PositionTargets(targets) => assert_eq!(targets, controller.pos_ref()),
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_partial_gain_update_example() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    runtime
        .add_robot("centauro", mock_articulation(), SRDF)
        .unwrap();
    // 轮关节也设为 300，得到全 300 的增益缓冲区
    runtime
        .update_jnt_imp_control("centauro", 300.0, 20.0, 300.0, 20.0)
        .unwrap();

    let controller = runtime.controller_mut("centauro").unwrap();
    assert!(
        controller
            .pos_gains()
            .as_matrix()
            .iter()
            .all(|&g| g == 300.0)
    );

    let report = controller
        .set_gains(
            Some(&batch(1, 2, &[5.0, 7.0])),
            None,
            Some(&[1]),
            Some(&[0, 2]),
        )
        .unwrap();
    assert!(report.pos_gains);
    assert!(report.vel_gains);
    assert_eq!(controller.pos_gains().row_to_vec(0), vec![300.0, 300.0, 300.0]);
    assert_eq!(controller.pos_gains().row_to_vec(1), vec![5.0, 300.0, 7.0]);
}

#[test]
fn test_out_of_bounds_joint_index_is_rejected() {
    let sink = Arc::new(MemorySink::new());
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), sink.clone()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();
    sink.clear();
    m.take_commands();

    let controller = runtime.controller_mut("centauro").unwrap();
    let before = (controller.pos_gains().clone(), controller.vel_gains().clone());
    let report = controller
        .set_gains(
            Some(&batch(2, 1, &[1.0, 1.0])),
            None,
            None,
            Some(&[5]),
        )
        .unwrap();

    assert!(!report.pos_gains);
    assert_eq!(controller.pos_gains(), &before.0);
    assert_eq!(controller.vel_gains(), &before.1);
    assert!(m.commands().is_empty());
    assert!(!sink.is_empty());
}

#[test]
fn test_update_jnt_imp_control() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    runtime
        .update_jnt_imp_control("centauro", 150.0, 12.0, 0.0, 4.0)
        .unwrap();
    let controller = runtime.controller("centauro").unwrap();
    assert_eq!(controller.pos_gains().row_to_vec(1), vec![150.0, 150.0, 0.0]);
    assert_eq!(controller.vel_gains().row_to_vec(1), vec![12.0, 12.0, 4.0]);

    // 非覆盖模式下增益立即下发到原生 PD
    let (kps, kds) = m.gains();
    assert_eq!(&kps, controller.pos_gains());
    assert_eq!(&kds, controller.vel_gains());

    assert!(matches!(
        runtime.update_jnt_imp_control("aliengo", 1.0, 1.0, 1.0, 1.0),
        Err(RuntimeError::UnknownRobot(_))
    ));
}

#[test]
fn test_reset_is_idempotent() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();
    runtime
        .update_jnt_imp_control("centauro", 10.0, 1.0, 0.0, 1.0)
        .unwrap();

    runtime.reset().unwrap();
    let snapshot = |rt: &TaskRuntime| {
        let c = rt.controller("centauro").unwrap();
        (
            c.pos_gains().clone(),
            c.vel_gains().clone(),
            c.pos_ref().clone(),
            c.imp_eff().clone(),
            c.phase(),
        )
    };
    let first = snapshot(&runtime);
    runtime.reset().unwrap();
    let second = snapshot(&runtime);
    assert_eq!(first, second);

    // reset 恢复控制器默认增益（轮关节除外）
    assert_eq!(first.0.row_to_vec(0), vec![300.0, 300.0, 0.0]);
    assert!(first.4.is_ready());
}

#[test]
fn test_override_mode_sends_only_efforts() {
    let mut config = cpu_config(&["centauro"]);
    config.override_art_controller = true;
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    // 原生 PD 增益被清零
    let (kps, kds) = m.gains();
    assert!(kps.is_all_zero());
    assert!(kds.is_all_zero());

    m.drive_joint_positions(batch(2, 3, &[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
    runtime.refresh_states(false).unwrap();
    m.take_commands();
    runtime.apply_cmds(false).unwrap();

    let commands = m.take_commands();
    let kinds: Vec<_> = commands.iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec!["synchronize", "efforts"]);

    // imp_eff = kp·(homing − pos) + kd·(0 − 0)，轮关节 kp = 0
    let controller = runtime.controller("centauro").unwrap();
    let expected = batch(
        2,
        3,
        &[300.0 * (0.3 - 0.1), 300.0 * -0.6, 0.0, 300.0 * 0.3, 300.0 * -0.6, 0.0],
    );
    for (a, b) in controller
        .imp_eff()
        .as_matrix()
        .iter()
        .zip(expected.as_matrix().iter())
    {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
    match &commands[1] {
        MockCommand::Efforts(efforts) => assert_eq!(efforts, controller.imp_eff()),
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_filtered_commands() {
    let (dt, bandwidth) = (0.01, 10.0);
    let mut config = cpu_config(&["centauro"]);
    config.filter_dt = Some(dt);
    config.filter_bandwidth = bandwidth;
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();
    m.take_commands();

    runtime.apply_cmds(true).unwrap();

    // 滤波器从零开始：y_1 = c2·ref_1
    let a = 2.0 * std::f64::consts::PI * bandwidth * dt / 2.0;
    let c2 = a / (1.0 + a);
    let commands = m.take_commands();
    match &commands[2] {
        MockCommand::PositionTargets(targets) => {
            assert_relative_eq!(targets[(0, 0)], 0.3 * c2, epsilon = 1e-12);
            assert_relative_eq!(targets[(1, 1)], -0.6 * c2, epsilon = 1e-12);
        },
        other => panic!("unexpected command: {:?}", other),
    }
    // 参考缓冲区本身不被滤波改写
    assert_eq!(
        runtime.controller("centauro").unwrap().pos_ref().row_to_vec(0),
        vec![0.3, -0.6, 0.0]
    );
}

#[test]
fn test_two_robot_kinds() {
    let mut runtime =
        TaskRuntime::new(cpu_config(&["centauro", "aliengo"]), tracing_sink()).unwrap();
    let centauro = mock_articulation();
    let aliengo = Arc::new(robogym_articulation::MockArticulation::new(2, &["hip", "knee"]));
    runtime.add_robot("centauro", centauro, SRDF).unwrap();
    assert!(!runtime.is_complete());
    runtime.add_robot("aliengo", aliengo.clone(), SRDF).unwrap();
    assert!(runtime.is_complete());

    // 两种机器人分别位于 π 与 2π
    let offsets = runtime.spawn_offsets();
    assert_relative_eq!(offsets[0].x, -1.0, epsilon = 1e-12);
    assert_relative_eq!(offsets[1].x, 1.0, epsilon = 1e-12);

    // 没有轮关节的机器人保持默认增益
    let controller = runtime.controller("aliengo").unwrap();
    assert_eq!(controller.pos_gains().row_to_vec(0), vec![300.0, 300.0]);
    assert_eq!(controller.vel_gains().row_to_vec(0), vec![20.0, 20.0]);

    let sync = runtime.synchronizer("aliengo").unwrap();
    assert_relative_eq!(sync.root_p_default()[(1, 0)], 1.0, epsilon = 1e-12);

    runtime.refresh_states(false).unwrap();
    runtime.apply_cmds(false).unwrap();
    assert!(
        runtime
            .robots()
            .iter()
            .all(|r| r.controller().phase().is_ready())
    );
}

#[test]
fn test_uninitialized_articulation_mid_run_is_fatal() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    m.set_initialized(false);
    let err = runtime.apply_cmds(false).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Control(ControlError::ArticulationNotInitialized)
    ));
    assert!(err.is_fatal());

    assert!(matches!(
        runtime.refresh_states(false),
        Err(RuntimeError::Sync(SyncError::ArticulationNotInitialized))
    ));
}

#[test]
fn test_synch_default_root_states() {
    let mut runtime = TaskRuntime::new(cpu_config(&["centauro"]), tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    let p = batch(2, 3, &[4.0, 4.0, 0.5, 8.0, 8.0, 0.5]);
    let q = batch(2, 4, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    m.drive_root_pose(p.clone(), q);
    runtime.refresh_states(false).unwrap();
    runtime.synch_default_root_states();
    assert_eq!(
        runtime.synchronizer("centauro").unwrap().root_p_default(),
        &p
    );
}

#[test]
fn test_reset_integrated_zeroes_velocities_in_direct_mode() {
    let mut config = cpu_config(&["centauro"]);
    config.integration_dt = 0.005;
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();
    assert_eq!(runtime.velocity_source(), VelocitySource::Direct);
    assert_eq!(runtime.integration_dt(), 0.005);

    let q = batch(2, 3, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    let v = batch(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    m.drive_joint_positions(q.clone());
    m.drive_joint_velocities(v.clone());

    runtime.reset_integrated().unwrap();
    let sync = runtime.synchronizer("centauro").unwrap();
    assert!(sync.jnts_v().is_all_zero());
    assert_eq!(sync.jnts_q_prev(), &q);
    assert!(runtime.controller("centauro").unwrap().vel().is_all_zero());
    assert_eq!(
        runtime.controller("centauro").unwrap().pos_ref(),
        runtime.homing("centauro").unwrap().get_homing()
    );

    // 之后的周期仍按配置的来源直接读取
    runtime.refresh_states(false).unwrap();
    assert_eq!(runtime.controller("centauro").unwrap().vel(), &v);
}

#[test]
fn test_update_solver_options_scales_iterations() {
    let mut config = cpu_config(&["centauro", "kyon"]);
    config.pos_iter_increase_factor = 3;
    config.vel_iter_increase_factor = 2;
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    let centauro = mock_articulation();
    let kyon = mock_articulation();
    runtime.add_robot("centauro", centauro.clone(), SRDF).unwrap();
    runtime.add_robot("kyon", kyon.clone(), SRDF).unwrap();
    kyon.set_solver_iteration_counts(&[8, 16], &[1, 0]).unwrap();

    assert_eq!(
        runtime.scaled_solver_iterations(&[4, u32::MAX], &[1]),
        (vec![12, u32::MAX], vec![2])
    );

    runtime.update_solver_options().unwrap();
    assert_eq!(
        centauro.solver_iteration_counts().unwrap(),
        (vec![12, 12], vec![2, 2])
    );
    assert_eq!(
        kyon.solver_iteration_counts().unwrap(),
        (vec![24, 48], vec![2, 0])
    );
    assert_eq!(
        centauro.commands().last().map(MockCommand::kind),
        Some("solver_iterations")
    );

    // 每次调用都在当前次数上再放大一次
    runtime.update_solver_options().unwrap();
    assert_eq!(
        centauro.solver_iteration_counts().unwrap(),
        (vec![36, 36], vec![4, 4])
    );
}

#[test]
fn test_update_solver_options_with_invalid_factors_keeps_counts() {
    let sink = Arc::new(MemorySink::new());
    let mut config = cpu_config(&["centauro"]);
    config.pos_iter_increase_factor = 0;
    config.vel_iter_increase_factor = -2;
    let mut runtime = TaskRuntime::new(config, sink.clone()).unwrap();
    let m = mock_articulation();
    runtime.add_robot("centauro", m.clone(), SRDF).unwrap();

    runtime.update_solver_options().unwrap();
    assert_eq!(m.solver_iteration_counts().unwrap(), (vec![4, 4], vec![1, 1]));
    let defaulted = sink
        .events()
        .into_iter()
        .filter(|(_, d)| matches!(d, Diagnostic::DefaultApplied { .. }))
        .count();
    assert_eq!(defaulted, 2);

    m.set_initialized(false);
    let err = runtime.update_solver_options().unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Articulation(ArticulationError::NotInitialized)
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_contact_layout_is_resolved_per_robot() {
    let sink = Arc::new(MemorySink::new());
    let mut config = cpu_config(&["centauro", "kyon"]);
    config.contact.prims.insert(
        "centauro".into(),
        vec!["contact_1".into(), "contact_2".into()],
    );
    config.contact.offsets.insert(
        "centauro".into(),
        BTreeMap::from([
            ("contact_1".to_string(), [0.0, 0.0, -0.1]),
            ("contact_2".to_string(), [0.0, 0.1, -0.1]),
        ]),
    );
    // contact_2 缺少半径：全部回退为默认值
    config.contact.radii.insert(
        "centauro".into(),
        BTreeMap::from([("contact_1".to_string(), 0.05)]),
    );
    let mut runtime = TaskRuntime::new(config, sink.clone()).unwrap();
    runtime
        .add_robot("centauro", mock_articulation(), SRDF)
        .unwrap();
    runtime.add_robot("kyon", mock_articulation(), SRDF).unwrap();

    let layout = runtime.robot("centauro").unwrap().contact_layout().unwrap();
    assert_eq!(layout.robot(), "centauro");
    assert_eq!(layout.prims(), ["contact_1", "contact_2"]);
    assert_eq!(layout.offsets(), [[0.0, 0.0, -0.1], [0.0, 0.1, -0.1]]);
    assert_eq!(layout.radii(), [0.003, 0.003]);
    assert_eq!(layout.defaulted(), ["sensor_radii"]);
    assert_eq!(layout.sensor("contact_2"), Some(([0.0, 0.1, -0.1], 0.003)));

    let contact_events: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|(source, _)| *source == "contact_sensor")
        .collect();
    assert_eq!(contact_events.len(), 1);
    assert!(matches!(
        &contact_events[0].1,
        Diagnostic::DefaultApplied { scope, option, .. }
            if scope == "centauro" && option == "sensor_radii"
    ));

    // 未配置接触连杆的机器人没有布局
    assert!(runtime.robot("kyon").unwrap().contact_layout().is_none());
}

#[test]
fn test_contact_layout_missing_robot_key_is_fatal() {
    let mut config = cpu_config(&["centauro"]);
    config
        .contact
        .prims
        .insert("centauro".into(), vec!["contact_1".into()]);
    let mut runtime = TaskRuntime::new(config, tracing_sink()).unwrap();
    assert!(matches!(
        runtime.add_robot("centauro", mock_articulation(), SRDF),
        Err(RuntimeError::Config(ConfigError::MissingRobotKey { option: "contact_offsets", .. }))
    ));
    assert!(runtime.robot("centauro").is_none());
}
