//! Record/replay integration tests

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::{play_script, sample_script, test_session, test_session_with, test_table};
use crate::command::CommandState;
use crate::recorder::RecordingMeta;
use crate::replayer::ReplayPhase;
use crate::session::SessionEvent;
use crate::spec::{CommandSpec, CommandSpecTable, InputBinding};

fn state_row(session: &crate::session::Session<super::Runner, crate::input::ManualPoller>) -> Vec<CommandState> {
    ["left", "right", "jump"]
        .iter()
        .map(|name| session.bank().state(name).unwrap().clone())
        .collect()
}

#[test]
fn replay_reproduces_the_live_command_state_sequence() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();

    let script = sample_script();
    let mut live_states = Vec::new();
    let mut live_trajectory = Vec::new();
    for keys in &script {
        session.poller_mut().clear();
        for code in *keys {
            session.poller_mut().set_key(code, true);
        }
        session.run_tick();
        live_states.push(state_row(&session));
        live_trajectory.push(*session.sim().trajectory.last().unwrap());
    }
    session.poller_mut().clear();

    let recording = Arc::new(session.stop_recording().unwrap());
    assert_eq!(recording.tick_count, script.len() as u64);
    // Idle and held-steady stretches compressed
    assert!(recording.frames.len() < script.len());

    // Replay on the same session: the snapshot restore rewinds the sim
    session.begin_replay(Arc::clone(&recording)).unwrap();
    let mut replay_states = Vec::new();
    let mut replay_trajectory = Vec::new();
    for _ in 0..recording.tick_count {
        session.run_tick();
        replay_states.push(state_row(&session));
        replay_trajectory.push(*session.sim().trajectory.last().unwrap());
    }

    assert_eq!(replay_states, live_states);
    assert_eq!(replay_trajectory, live_trajectory);
}

#[test]
fn preflight_runs_exactly_n_steps_synchronously() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &sample_script());

    let mut recording = session.stop_recording().unwrap();
    recording.edit_cutoffs(7, recording.tick_count);
    let recording = Arc::new(recording);

    let steps_before = session.sim().steps;
    let phase = session.begin_replay(Arc::clone(&recording)).unwrap();
    assert_eq!(phase, ReplayPhase::Preflighting);
    // Nothing has run yet; the free-run happens in one synchronous pump
    assert_eq!(session.sim().steps, steps_before);

    assert!(session.pump_preflight(None));
    assert_eq!(session.sim().steps, steps_before + 7);
    assert_eq!(session.replay_phase(), ReplayPhase::Live);
}

#[test]
fn stopping_mid_preflight_leaves_no_state_edges() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &sample_script());

    let mut recording = session.stop_recording().unwrap();
    recording.edit_cutoffs(10, recording.tick_count);
    session.begin_replay(Arc::new(recording)).unwrap();

    // Run part of the preflight window, then cancel
    assert!(!session.pump_preflight(Some(4)));
    assert_eq!(session.replay_phase(), ReplayPhase::Preflighting);
    session.stop_replay();

    assert_eq!(session.replay_phase(), ReplayPhase::Stopped);
    for name in ["left", "right", "jump", "pause"] {
        let state = session.bank().state(name).unwrap();
        assert!(
            !state.started && !state.released && !state.held,
            "command {name} leaked an edge from the discarded cursor"
        );
    }
}

#[test]
fn rebinding_a_key_does_not_change_replay_output() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &sample_script());
    let recording = Arc::new(session.stop_recording().unwrap());

    session.begin_replay(Arc::clone(&recording)).unwrap();
    for _ in 0..recording.tick_count {
        session.run_tick();
    }
    let baseline = session.sim().trajectory.clone();
    let baseline_tail = &baseline[baseline.len() - recording.tick_count as usize..];

    // Fresh session with jump moved from Space to KeyZ
    let mut remapped = test_table();
    remapped
        .commands
        .iter_mut()
        .find(|c| c.name == "jump")
        .unwrap()
        .bindings = vec![InputBinding::Key {
        code: "KeyZ".to_string(),
    }];
    let mut session2 = test_session_with(CommandSpecTable::new(remapped.commands).unwrap());

    session2.begin_replay(Arc::clone(&recording)).unwrap();
    for _ in 0..recording.tick_count {
        session2.run_tick();
    }
    assert_eq!(
        &session2.sim().trajectory[..],
        baseline_tail,
        "stored frames reference command names, so rebinding must not matter"
    );
}

#[test]
fn removing_a_referenced_command_degrades_to_a_warning() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &sample_script());
    let recording = Arc::new(session.stop_recording().unwrap());

    // A table without "jump" at all
    let table = CommandSpecTable::new(
        test_table()
            .commands
            .into_iter()
            .filter(|c| c.name != "jump")
            .collect::<Vec<CommandSpec>>(),
    )
    .unwrap();
    let mut session2 = test_session_with(table);

    // Must not panic; the jump ticks replay with the command simply absent
    session2.begin_replay(Arc::clone(&recording)).unwrap();
    for _ in 0..recording.tick_count {
        session2.run_tick();
    }
    let (_, y) = *session2.sim().trajectory.last().unwrap();
    assert_eq!(y, 0.0, "removed command must not be restored");
}

#[test]
fn unignorable_live_input_merges_into_replayed_frames() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &[&["ArrowRight"], &["ArrowRight"], &["ArrowRight"]]);
    let recording = Arc::new(session.stop_recording().unwrap());

    session.begin_replay(recording).unwrap();
    // Hold Escape live while the replay runs
    session.poller_mut().set_key("Escape", true);
    session.run_tick();

    assert!(session.bank().state("pause").unwrap().held);
    // The stored frame still applied alongside
    assert!(session.bank().state("right").unwrap().held);

    // Ordinary commands from live input do NOT merge in
    session.poller_mut().set_key("Space", true);
    session.run_tick();
    assert!(!session.bank().state("jump").unwrap().held);
}

#[test]
fn replay_end_falls_back_to_live_sampling_and_fires_hooks() {
    let events: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let mut session = test_session();
    let log = Rc::clone(&events);
    session.on_event(move |event| {
        log.borrow_mut().push(
            match event {
                SessionEvent::RecordBegin { .. } => "record_begin",
                SessionEvent::RecordStop { .. } => "record_stop",
                SessionEvent::ReplayBegin { .. } => "replay_begin",
                SessionEvent::ReplayEnd => "replay_end",
                SessionEvent::ReplayStop => "replay_stop",
                SessionEvent::SpecSwapped { .. } => "spec_swapped",
                SessionEvent::SchedulerSuspended { .. } => "suspended",
            }
            .to_string(),
        );
    });

    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &[&["ArrowRight"], &["ArrowRight"]]);
    let recording = Arc::new(session.stop_recording().unwrap());

    session.begin_replay(recording).unwrap();
    session.run_tick();
    session.run_tick();
    assert_eq!(session.replay_phase(), ReplayPhase::Live);

    // Cursor exhausted: this tick ends the replay and samples live instead
    session.poller_mut().set_key("ArrowLeft", true);
    session.run_tick();
    assert!(session.bank().state("left").unwrap().held);

    assert_eq!(
        *events.borrow(),
        vec![
            "record_begin".to_string(),
            "record_stop".to_string(),
            "replay_begin".to_string(),
            "replay_end".to_string(),
        ]
    );
}

#[test]
fn persistent_step_faults_suspend_the_scheduler() {
    let suspended: Rc<RefCell<Option<u32>>> = Rc::new(RefCell::new(None));
    let mut session = test_session();
    let seen = Rc::clone(&suspended);
    session.on_event(move |event| {
        if let SessionEvent::SchedulerSuspended { faults } = event {
            *seen.borrow_mut() = Some(*faults);
        }
    });

    session.sim_mut().fail_steps = u32::MAX;
    for _ in 0..crate::scheduler::MAX_CONSECUTIVE_FAULTS {
        session.run_tick();
    }

    assert!(session.is_suspended());
    assert_eq!(*suspended.borrow(), Some(crate::scheduler::MAX_CONSECUTIVE_FAULTS));

    // Suspension is fatal for the session: ticking does nothing further
    let steps = session.sim().steps;
    session.tick(std::time::Instant::now());
    assert_eq!(session.sim().steps, steps);
}

#[test]
fn editing_active_replay_cutoffs_restarts_playback() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &sample_script());
    let recording = Arc::new(session.stop_recording().unwrap());

    session.begin_replay(recording).unwrap();
    session.run_tick();
    session.run_tick();

    let restarted = session.edit_replay_cutoffs(5, 9).unwrap();
    assert!(restarted);
    // The new window asks for a preflight, observed immediately
    assert_eq!(session.replay_phase(), ReplayPhase::Preflighting);

    let steps_before = session.sim().steps;
    session.pump_preflight(None);
    assert_eq!(session.sim().steps, steps_before + 5);

    // 4 live ticks remain inside the window
    for _ in 0..4 {
        session.run_tick();
        assert_eq!(session.replay_phase(), ReplayPhase::Live);
    }
    session.run_tick();
    assert_eq!(session.replay_phase(), ReplayPhase::Idle);
}

#[test]
fn snapshot_only_recordings_restore_state_without_playing() {
    let mut session = test_session();
    play_script(&mut session, &[&["ArrowRight"], &["ArrowRight"], &["ArrowRight"]]);
    assert_eq!(session.sim().x, 3.0);

    session
        .begin_recording(RecordingMeta::new("level_1").snapshot_only())
        .unwrap();
    session.run_tick();
    let recording = session.stop_recording().unwrap();
    assert!(recording.snapshot_only);
    assert!(recording.frames.is_empty());

    // Keep playing, then jump back via the snapshot
    play_script(&mut session, &[&["ArrowRight"], &["ArrowRight"]]);
    assert_eq!(session.sim().x, 5.0);

    session.begin_replay(Arc::new(recording)).unwrap();
    assert_eq!(session.sim().x, 3.0);
}

#[test]
fn no_recapture_playback_is_not_mirrored() {
    let mut session = test_session();
    session.begin_recording(RecordingMeta::new("level_1")).unwrap();
    play_script(&mut session, &[&["ArrowRight"], &["ArrowRight"], &["ArrowRight"]]);
    let mut source = session.stop_recording().unwrap();
    source.flags |= crate::recording::RecordingFlags::NO_RECAPTURE;
    let source = Arc::new(source);

    session.begin_recording(RecordingMeta::new("take_2")).unwrap();
    session.begin_replay(Arc::clone(&source)).unwrap();
    for _ in 0..source.tick_count {
        session.run_tick();
    }
    // Replay ended; two more live ticks mirror normally
    session.run_tick();
    session.run_tick();

    let take_2 = session.stop_recording().unwrap();
    assert_eq!(take_2.tick_count, 2);
}

#[test]
fn spec_hot_swap_mid_session_keeps_running_state() {
    let mut session = test_session();
    play_script(&mut session, &[&["ArrowRight"]]);

    // Swap in a table with jump rebound; bump expected version
    let mut commands = test_table().commands;
    commands.iter_mut().find(|c| c.name == "jump").unwrap().bindings =
        vec![InputBinding::Key {
            code: "KeyZ".to_string(),
        }];
    let delta = session
        .command_spec_changed(CommandSpecTable::new(commands).unwrap())
        .unwrap();
    assert_eq!(delta.rebound, vec!["jump".to_string()]);
    assert_eq!(session.table().version, 1);

    // The new binding works immediately
    session.poller_mut().set_key("KeyZ", true);
    session.run_tick();
    assert!(session.bank().state("jump").unwrap().held);
    assert_eq!(session.sim().y, 10.0);
}
