//! Property tests for the entity store.
//!
//! Random sequences of scene operations are applied and the store's
//! invariants are checked after every step: live counts match, destroyed
//! handles never resolve again, and no table keeps values for dead entities.

use cairn_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Tag(u32);

#[derive(Debug, Clone)]
enum SceneOp {
    Spawn,
    SpawnPos(f32, f32),
    Despawn(usize),
    InsertTag(usize, u32),
    RemoveTag(usize),
}

fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn scene_op_strategy() -> impl Strategy<Value = SceneOp> {
    prop_oneof![
        Just(SceneOp::Spawn),
        (finite_f32(), finite_f32()).prop_map(|(x, y)| SceneOp::SpawnPos(x, y)),
        (0..100usize).prop_map(SceneOp::Despawn),
        (0..100usize, any::<u32>()).prop_map(|(i, t)| SceneOp::InsertTag(i, t)),
        (0..100usize).prop_map(SceneOp::RemoveTag),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(scene_op_strategy(), 1..60)) {
        let mut scene = Scene::new();
        scene.register_component::<Pos>("pos");
        scene.register_component::<Tag>("tag");

        let mut alive: Vec<EntityId> = Vec::new();
        let mut dead: Vec<EntityId> = Vec::new();

        for op in ops {
            match op {
                SceneOp::Spawn => alive.push(scene.spawn()),
                SceneOp::SpawnPos(x, y) => alive.push(scene.spawn_with(Pos { x, y })),
                SceneOp::Despawn(idx) => {
                    if !alive.is_empty() {
                        let e = alive.remove(idx % alive.len());
                        prop_assert!(scene.despawn(e).is_ok());
                        dead.push(e);
                    }
                }
                SceneOp::InsertTag(idx, t) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        prop_assert!(scene.insert_component(e, Tag(t)).is_ok());
                        prop_assert_eq!(scene.get_component::<Tag>(e), Some(&Tag(t)));
                    }
                }
                SceneOp::RemoveTag(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        prop_assert!(scene.remove_component::<Tag>(e).is_ok());
                        prop_assert!(!scene.has_component::<Tag>(e));
                    }
                }
            }

            prop_assert_eq!(scene.entity_count(), alive.len());
            for &e in &alive {
                prop_assert!(scene.is_alive(e));
            }
            for &e in &dead {
                prop_assert!(!scene.is_alive(e));
                prop_assert!(scene.get_component::<Tag>(e).is_none());
                prop_assert!(scene.get_component::<Pos>(e).is_none());
            }
            prop_assert!(scene.component_count::<Tag>() <= alive.len());
            prop_assert!(scene.component_count::<Pos>() <= alive.len());
        }
    }

    #[test]
    fn despawned_handles_are_never_reissued(cycles in 1..200usize) {
        let mut scene = Scene::new();
        let mut issued = std::collections::HashSet::new();
        for _ in 0..cycles {
            let e = scene.spawn();
            prop_assert!(issued.insert(e), "handle {:?} issued twice", e);
            scene.despawn(e).unwrap();
        }
    }
}
