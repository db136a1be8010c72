//! Property tests for arrival-order independence.

use mirror_core::{
    Message, MessageIntake, MessageKind, Pose, PoseMsg, Reconciler, SyncConfig, Vector3, VisualMsg,
};
use proptest::prelude::*;

fn visual(name: &str, parent: Option<&str>) -> Message {
    Message::Visual(VisualMsg {
        name: name.to_string(),
        parent_name: parent.map(str::to_string),
        ..VisualMsg::default()
    })
}

/// `a`, `a::n1`, `a::n1::n2`, ... with each parent's name.
fn chain(depth: usize) -> Vec<(String, Option<String>)> {
    let mut out = vec![("a".to_string(), None)];
    for level in 1..depth {
        let parent = out[level - 1].0.clone();
        out.push((format!("{parent}::n{level}"), Some(parent)));
    }
    out
}

proptest! {
    #[test]
    fn prop_latest_pose_wins_for_any_interleaving(
        xs in prop::collection::vec(-100.0f64..100.0, 1..8),
        visual_at in 0usize..8,
        per_tick in 1usize..4,
    ) {
        let visual_at = visual_at.min(xs.len());
        let mut events: Vec<Message> = xs
            .iter()
            .map(|x| Message::Pose(PoseMsg::new("box1", Pose::from_position(*x, 0.0, 0.0))))
            .collect();
        events.insert(visual_at, visual("box1", None));

        let mut reconciler = Reconciler::new(SyncConfig::default());
        let intake = MessageIntake::new();
        for chunk in events.chunks(per_tick) {
            for message in chunk {
                intake.enqueue(message.clone());
            }
            reconciler.tick(&intake);
        }
        reconciler.tick(&intake);
        reconciler.tick(&intake);

        let last = xs[xs.len() - 1];
        let entity = reconciler.registry().get_by_name("box1");
        prop_assert!(entity.is_some());
        prop_assert_eq!(
            entity.map(|e| e.pose.position),
            Some(Vector3::new(last, 0.0, 0.0))
        );
        prop_assert_eq!(reconciler.pending_len(), 0);
    }

    #[test]
    fn prop_nested_chain_resolves_in_one_tick(
        names in (1usize..6).prop_map(chain).prop_shuffle()
    ) {
        let mut reconciler = Reconciler::new(SyncConfig::default());
        let intake = MessageIntake::new();
        for (name, parent) in &names {
            intake.enqueue(visual(name, parent.as_deref()));
        }

        let report = reconciler.tick(&intake);

        prop_assert_eq!(report.created.len(), names.len());
        prop_assert_eq!(reconciler.pending_len(), 0);
        // Every entity is created after its parent.
        for pair in report.created.windows(2) {
            prop_assert!(pair[0].len() <= pair[1].len());
        }
        for (name, parent) in &names {
            let entity = reconciler.registry().get_by_name(name);
            prop_assert!(entity.is_some());
            let parent_name = entity.and_then(|e| reconciler.registry().parent_name(e.id));
            match parent {
                Some(parent) => prop_assert_eq!(parent_name, Some(parent.as_str())),
                None => prop_assert_eq!(parent_name, Some(mirror_core::WORLD_ROOT)),
            }
        }
    }

    #[test]
    fn prop_repeated_upsert_keeps_one_entity(repeats in 1usize..10, across_ticks in any::<bool>()) {
        let mut reconciler = Reconciler::new(SyncConfig::default());
        let intake = MessageIntake::new();
        for _ in 0..repeats {
            intake.enqueue(visual("box", None));
            if across_ticks {
                reconciler.tick(&intake);
            }
        }
        reconciler.tick(&intake);

        prop_assert_eq!(reconciler.registry().len(), 1);
    }

    #[test]
    fn prop_orphans_are_kept_not_lost(count in 1usize..10, ticks in 1usize..5) {
        let mut reconciler = Reconciler::new(SyncConfig::default());
        let intake = MessageIntake::new();
        for i in 0..count {
            intake.enqueue(visual(&format!("missing::child{i}"), Some("missing")));
        }
        for _ in 0..ticks {
            reconciler.tick(&intake);
        }

        prop_assert_eq!(reconciler.pending_counts()[&MessageKind::Visual], count);
        prop_assert!(reconciler.registry().is_empty());
    }
}
