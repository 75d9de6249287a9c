//! Property tests over random operation sequences.

use kvcache_master::{MasterConfig, MasterService, ObjectState, SegmentId};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Start { key: u8, size: u64, replicas: usize },
    End { key: u8 },
    Revoke { key: u8 },
    Remove { key: u8 },
    Unmount { segment: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12, 1u64..400, 1usize..4)
            .prop_map(|(key, size, replicas)| Op::Start { key, size, replicas }),
        3 => (0u8..12).prop_map(|key| Op::End { key }),
        1 => (0u8..12).prop_map(|key| Op::Revoke { key }),
        2 => (0u8..12).prop_map(|key| Op::Remove { key }),
        1 => (0u8..4).prop_map(|segment| Op::Unmount { segment }),
    ]
}

const SEGMENTS: u64 = 4;
const CAPACITY: u64 = 1000;

proptest! {
    #[test]
    fn accounting_matches_live_replicas(ops in prop::collection::vec(op(), 1..80)) {
        let master = MasterService::new(MasterConfig::default());
        for i in 0..SEGMENTS {
            master
                .mount_segment(&SegmentId::new(format!("s{i}")), &"n".into(), CAPACITY)
                .unwrap();
        }

        // Model: key -> (state, size, replica count)
        let mut model: HashMap<String, (ObjectState, u64, usize)> = HashMap::new();

        for op in ops {
            match op {
                Op::Start { key, size, replicas } => {
                    let key = format!("k{key}");
                    let result = master.put_start(&key, size, replicas);
                    if model.contains_key(&key) {
                        prop_assert!(result.is_err());
                    } else if let Ok(placed) = result {
                        prop_assert_eq!(placed.len(), replicas);
                        model.insert(key, (ObjectState::PutInProgress, size, replicas));
                    }
                }
                Op::End { key } => {
                    let key = format!("k{key}");
                    let ok = master.put_end(&key).is_ok();
                    let expected = matches!(model.get(&key), Some((ObjectState::PutInProgress, _, _)));
                    prop_assert_eq!(ok, expected);
                    if ok {
                        if let Some(entry) = model.get_mut(&key) {
                            entry.0 = ObjectState::Complete;
                        }
                    }
                }
                Op::Revoke { key } => {
                    let key = format!("k{key}");
                    let ok = master.put_revoke(&key).is_ok();
                    let expected = matches!(model.get(&key), Some((ObjectState::PutInProgress, _, _)));
                    prop_assert_eq!(ok, expected);
                    if ok {
                        model.remove(&key);
                    }
                }
                Op::Remove { key } => {
                    let key = format!("k{key}");
                    let ok = master.remove(&key).is_ok();
                    prop_assert_eq!(ok, model.remove(&key).is_some());
                }
                Op::Unmount { segment } => {
                    // Drain keeps every replica valid, so the model is unchanged.
                    let _ = master.unmount_segment(&SegmentId::new(format!("s{segment}")));
                }
            }

            for (key, (state, _, replicas)) in &model {
                prop_assert_eq!(master.exist_key(key), *state == ObjectState::Complete);
                if *state == ObjectState::Complete {
                    prop_assert_eq!(master.get_replica_list(key).unwrap().len(), *replicas);
                } else {
                    prop_assert!(master.get_replica_list(key).is_err());
                }
            }

            let used: u64 = model.values().map(|(_, size, n)| size * *n as u64).sum();
            let segments = master.segments();
            let free: u64 = segments.iter().map(|s| s.free_bytes).sum();
            let capacity: u64 = segments.iter().map(|s| s.capacity).sum();
            prop_assert!(free <= capacity);
            for s in &segments {
                prop_assert!(s.free_bytes <= s.capacity);
            }
            // Removed segments drop out of the listing only once empty.
            prop_assert_eq!(capacity - free, used);
        }
    }

    #[test]
    fn round_trip_restores_free_bytes(sizes in prop::collection::vec(1u64..500, 1..30)) {
        let master = MasterService::new(MasterConfig::default());
        master.mount_segment(&"s0".into(), &"n".into(), 1 << 20).unwrap();
        master.mount_segment(&"s1".into(), &"n".into(), 1 << 20).unwrap();

        for (i, size) in sizes.iter().enumerate() {
            let key = format!("k{i}");
            master.put_start(&key, *size, 2).unwrap();
            master.put_end(&key).unwrap();
        }
        for i in 0..sizes.len() {
            master.remove(&format!("k{i}")).unwrap();
        }

        for s in master.segments() {
            prop_assert_eq!(s.free_bytes, s.capacity);
            prop_assert_eq!(s.replica_count, 0);
        }
    }
}
