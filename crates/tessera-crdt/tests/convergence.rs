//! Convergence tests for delta-state CRDTs
//!
//! Replicas write independently and exchange either full state, generated
//! deltas, or operation deltas delivered out of order and duplicated. Every
//! path must end in the same state.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;
use std::sync::Arc;
use tessera_core::{DeltaCrdt, Environment, Error, Lattice, SimpleEnvironment};
use tessera_crdt::{BoundedCounter, CompositeMap, LwwMap, MvMap, PnCounter, Rga, ValueKind};

fn replica_envs(names: &[&str]) -> Vec<Arc<SimpleEnvironment>> {
    names.iter().map(|name| SimpleEnvironment::shared(*name)).collect()
}

/// Merge every delta into a blank merge-only value after shuffling the
/// queue and duplicating roughly a third of it.
fn deliver_shuffled<T: DeltaCrdt>(deltas: &[T], rng: &mut StdRng) -> T {
    let mut queue: Vec<&T> = deltas.iter().collect();
    let dupes: Vec<&T> = deltas.iter().filter(|_| rng.gen_bool(0.3)).collect();
    queue.extend(dupes);
    queue.shuffle(rng);

    let mut replica = T::bottom();
    for delta in queue {
        replica.merge(delta);
    }
    replica
}

/// Pairwise full-state sync until every replica holds the join of all.
fn sync_all<T: DeltaCrdt + Debug>(replicas: &mut [T]) {
    let joined = replicas.iter().fold(T::bottom(), |acc, r| acc.join(r));
    for replica in replicas.iter_mut() {
        replica.merge(&joined);
    }
    for pair in replicas.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn test_lww_typed_slots_scenario() {
    let env = SimpleEnvironment::shared("A");
    let mut map = LwwMap::new(env);

    map.put("k", true).unwrap();
    map.put("k", 3.14).unwrap();
    map.put("k", 42).unwrap();
    map.put("k", "v").unwrap();

    assert_eq!(map.get_boolean("k"), Some(true));
    assert_eq!(map.get_double("k"), Some(3.14));
    assert_eq!(map.get_integer("k"), Some(42));
    assert_eq!(map.get_string("k"), Some("v"));
}

#[test]
fn test_mv_concurrent_writes_scenario() {
    let envs = replica_envs(&["A", "B"]);
    let mut a = MvMap::new(envs[0].clone());
    let mut b = MvMap::new(envs[1].clone());

    a.put("k", "valA").unwrap();
    b.put("k", "valB").unwrap();
    b.merge(&a);

    let mut values = b.get_strings("k").unwrap();
    values.sort();
    assert_eq!(values, vec!["valA", "valB"]);
}

#[test]
fn test_bounded_counter_transfer_scenario() {
    let n = 11;
    let envs = replica_envs(&["A", "B"]);
    let mut a = BoundedCounter::new(envs[0].clone());
    let mut b = BoundedCounter::new(envs[1].clone());

    a.increment(n).unwrap();
    a.transfer(n / 2, "B").unwrap();
    b.merge(&a);

    assert_eq!(a.rights(), Ok(n - n / 2));
    assert_eq!(b.rights(), Ok(n / 2));
    assert_eq!(a.get(), n);
    assert_eq!(b.get(), n);
}

#[test]
fn test_sequence_divergent_branches_scenario() {
    let envs = replica_envs(&["A", "B"]);
    let mut a: Rga<String> = Rga::new(envs[0].clone());
    let mut b: Rga<String> = Rga::new(envs[1].clone());

    a.insert_at(0, "1".into()).unwrap();
    a.insert_at(1, "2".into()).unwrap();
    a.insert_at(1, "3".into()).unwrap();
    b.merge(&a);
    assert_eq!(b.to_vec(), vec!["1", "3", "2"]);

    // "6" after "3" on A; "4" then "5" after "3" on B
    a.insert_at(2, "6".into()).unwrap();
    b.insert_at(2, "4".into()).unwrap();
    b.insert_at(3, "5".into()).unwrap();

    let a_state = a.clone();
    a.merge(&b);
    b.merge(&a_state);

    let expected = vec!["1", "3", "4", "5", "6", "2"];
    assert_eq!(a.to_vec(), expected);
    assert_eq!(b.to_vec(), expected);
}

#[test]
fn test_sequence_three_way_symmetric_insert() {
    let envs = replica_envs(&["A", "B", "C"]);
    let mut lists: Vec<Rga<String>> = envs.iter().map(|env| Rga::new(env.clone())).collect();

    lists[0].push("x".into()).unwrap();
    let base = lists[0].clone();
    lists[1].merge(&base);
    lists[2].merge(&base);

    let deltas: Vec<_> = lists
        .iter_mut()
        .zip(["a", "b", "c"])
        .map(|(list, v)| list.insert_at(1, v.to_string()).unwrap())
        .collect();

    // Every delivery order of the three inserts yields the same list
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    for order in orders {
        let mut list = base.clone();
        for i in order {
            list.merge(&deltas[i]);
        }
        assert_eq!(list.to_vec(), vec!["x", "c", "b", "a"], "order {:?}", order);
    }

    sync_all(&mut lists);
    assert_eq!(lists[0].to_vec(), vec!["x", "c", "b", "a"]);
}

#[test]
fn test_read_only_environment_rejects_every_write() {
    let env = SimpleEnvironment::shared("A");
    let mut lww = LwwMap::new(env.clone());
    let mut mv = MvMap::new(env.clone());
    let mut pn = PnCounter::new(env.clone());
    let mut bc = BoundedCounter::new(env.clone());
    let mut rga: Rga<String> = Rga::new(env.clone());
    let mut map = CompositeMap::new(env.clone());

    lww.put("k", 1).unwrap();
    mv.put("k", 1).unwrap();
    pn.increment(1).unwrap();
    bc.increment(5).unwrap();
    rga.push("a".into()).unwrap();
    map.increment("c", 1).unwrap();
    let frontier = env.current_version_vector();

    env.set_read_only(true);
    let snapshot = (lww.clone(), mv.clone(), pn.clone(), bc.clone(), rga.clone(), map.clone());

    assert_eq!(lww.put("k", 2), Err(Error::ReadOnly));
    assert_eq!(lww.delete("k", ValueKind::Integer), Err(Error::ReadOnly));
    assert_eq!(mv.put("k", 2), Err(Error::ReadOnly));
    assert_eq!(mv.delete("k", ValueKind::Integer), Err(Error::ReadOnly));
    assert_eq!(pn.increment(1), Err(Error::ReadOnly));
    assert_eq!(pn.decrement(1), Err(Error::ReadOnly));
    assert_eq!(bc.increment(1), Err(Error::ReadOnly));
    assert_eq!(bc.decrement(1), Err(Error::ReadOnly));
    assert_eq!(bc.transfer(1, "B"), Err(Error::ReadOnly));
    assert_eq!(rga.insert_at(0, "b".into()), Err(Error::ReadOnly));
    assert_eq!(rga.remove_at(0), Err(Error::ReadOnly));
    assert_eq!(map.put_lww("k", 1), Err(Error::ReadOnly));
    assert_eq!(map.put_mv("k", 1), Err(Error::ReadOnly));
    assert_eq!(map.increment("c", 1), Err(Error::ReadOnly));

    assert_eq!(snapshot, (lww, mv, pn, bc, rga, map));
    assert_eq!(env.current_version_vector(), frontier);
}

// ============================================================================
// Delivery order
// ============================================================================

#[test]
fn test_lww_random_delivery_order() {
    let mut rng = StdRng::seed_from_u64(12345);
    let envs = replica_envs(&["A", "B", "C"]);
    let mut replicas: Vec<LwwMap> = envs.iter().map(|env| LwwMap::new(env.clone())).collect();
    let mut deltas = Vec::new();

    for round in 0..60 {
        let i = rng.gen_range(0..replicas.len());
        let key = format!("k{}", rng.gen_range(0..4));
        let delta = match rng.gen_range(0..3) {
            0 => replicas[i].put(key, round as i64),
            1 => replicas[i].put(key, format!("s{}", round)),
            _ => replicas[i].delete(key, ValueKind::Integer),
        };
        deltas.push(delta.unwrap());

        if rng.gen_bool(0.2) {
            let j = rng.gen_range(0..replicas.len());
            let source = replicas[j].clone();
            replicas[i].merge(&source);
        }
    }

    sync_all(&mut replicas);
    for _ in 0..5 {
        assert_eq!(deliver_shuffled(&deltas, &mut rng), replicas[0]);
    }
}

#[test]
fn test_mv_random_delivery_order() {
    let mut rng = StdRng::seed_from_u64(777);
    let envs = replica_envs(&["A", "B", "C"]);
    let mut replicas: Vec<MvMap> = envs.iter().map(|env| MvMap::new(env.clone())).collect();
    let mut deltas = Vec::new();

    for round in 0..60 {
        let i = rng.gen_range(0..replicas.len());
        let key = format!("k{}", rng.gen_range(0..3));
        let delta = if rng.gen_bool(0.8) {
            replicas[i].put(key, round as i64)
        } else {
            replicas[i].delete(key, ValueKind::Integer)
        };
        deltas.push(delta.unwrap());

        if rng.gen_bool(0.3) {
            let j = rng.gen_range(0..replicas.len());
            let source = replicas[j].clone();
            replicas[i].merge(&source);
        }
    }

    sync_all(&mut replicas);
    for _ in 0..5 {
        assert_eq!(deliver_shuffled(&deltas, &mut rng), replicas[0]);
    }
}

#[test]
fn test_pncounter_random_delivery_order() {
    let mut rng = StdRng::seed_from_u64(54321);
    let envs = replica_envs(&["A", "B", "C"]);
    let mut replicas: Vec<PnCounter> = envs.iter().map(|env| PnCounter::new(env.clone())).collect();
    let mut deltas = Vec::new();
    let mut expected = 0i64;

    for _ in 0..100 {
        let i = rng.gen_range(0..replicas.len());
        let amount = rng.gen_range(-5..10);
        expected += amount;
        deltas.push(replicas[i].increment(amount).unwrap());
    }

    sync_all(&mut replicas);
    assert_eq!(replicas[0].get(), expected);
    for _ in 0..5 {
        assert_eq!(deliver_shuffled(&deltas, &mut rng).get(), expected);
    }
}

#[test]
fn test_bounded_counter_random_delivery_order() {
    let mut rng = StdRng::seed_from_u64(4242);
    let names = ["A", "B", "C"];
    let envs = replica_envs(&names);
    let mut replicas: Vec<BoundedCounter> =
        envs.iter().map(|env| BoundedCounter::new(env.clone())).collect();
    let mut deltas = Vec::new();

    for _ in 0..120 {
        let i = rng.gen_range(0..replicas.len());
        let amount = rng.gen_range(1..6);
        let result = match rng.gen_range(0..3) {
            0 => replicas[i].increment(amount),
            1 => replicas[i].decrement(amount),
            _ => replicas[i].transfer(amount, names[rng.gen_range(0..names.len())]),
        };
        match result {
            Ok(delta) => deltas.push(delta),
            Err(err) => assert!(matches!(err, Error::InsufficientRights { .. })),
        }

        if rng.gen_bool(0.25) {
            let j = rng.gen_range(0..replicas.len());
            let source = replicas[j].clone();
            replicas[i].merge(&source);
        }
    }

    sync_all(&mut replicas);
    let merged = &replicas[0];
    assert!(merged.get() >= 0);
    let total_rights: i64 = names.iter().map(|n| merged.local_rights(&(*n).into())).sum();
    assert_eq!(total_rights, merged.get());
    for _ in 0..5 {
        assert_eq!(&deliver_shuffled(&deltas, &mut rng), merged);
    }
}

#[test]
fn test_rga_concurrent_editing_converges() {
    let mut rng = StdRng::seed_from_u64(99);
    let envs = replica_envs(&["A", "B", "C"]);
    let mut replicas: Vec<Rga<char>> = envs.iter().map(|env| Rga::new(env.clone())).collect();
    let mut deltas = Vec::new();

    for _ in 0..150 {
        let i = rng.gen_range(0..replicas.len());
        let len = replicas[i].len();
        let delta = if len == 0 || rng.gen_bool(0.7) {
            let c = rng.gen_range(b'a'..=b'z') as char;
            replicas[i].insert_at(rng.gen_range(0..=len), c)
        } else {
            replicas[i].remove_at(rng.gen_range(0..len))
        };
        deltas.push(delta.unwrap());

        if rng.gen_bool(0.2) {
            let j = rng.gen_range(0..replicas.len());
            let source = replicas[j].clone();
            replicas[i].merge(&source);
        }
    }

    sync_all(&mut replicas);
    let text: String = replicas[0].iter().collect();
    for _ in 0..5 {
        let delivered = deliver_shuffled(&deltas, &mut rng);
        assert_eq!(delivered.iter().collect::<String>(), text);
        assert_eq!(delivered, replicas[0]);
    }
}

#[test]
fn test_composite_random_delivery_order() {
    let mut rng = StdRng::seed_from_u64(2024);
    let envs = replica_envs(&["A", "B", "C"]);
    let mut replicas: Vec<CompositeMap> =
        envs.iter().map(|env| CompositeMap::new(env.clone())).collect();
    let mut deltas = Vec::new();

    for round in 0..90 {
        let i = rng.gen_range(0..replicas.len());
        let key = format!("k{}", rng.gen_range(0..3));
        let delta = match rng.gen_range(0..4) {
            0 => replicas[i].put_lww(key, round as i64),
            1 => replicas[i].put_mv(key, round as i64),
            2 => replicas[i].increment(key, 1),
            _ => replicas[i].delete_mv(key, ValueKind::Integer),
        };
        deltas.push(delta.unwrap());
    }

    sync_all(&mut replicas);
    for _ in 0..5 {
        assert_eq!(deliver_shuffled(&deltas, &mut rng), replicas[0]);
    }
}

// ============================================================================
// Anti-entropy through generated deltas
// ============================================================================

#[test]
fn test_generate_delta_anti_entropy() {
    let envs = replica_envs(&["A", "B"]);
    let mut a = CompositeMap::new(envs[0].clone());
    let mut b = CompositeMap::new(envs[1].clone());

    a.put_lww("title", "draft").unwrap();
    a.increment("views", 3).unwrap();
    b.put_mv("tags", "rust").unwrap();

    // Each side ships only what the other has not seen
    let to_b = a.generate_delta(&envs[1].current_version_vector());
    let to_a = b.generate_delta(&envs[0].current_version_vector());
    b.merge(&to_b);
    a.merge(&to_a);
    assert_eq!(a, b);

    // Nothing left to ship
    assert!(a.generate_delta(&envs[1].current_version_vector()).is_empty());

    b.put_lww("title", "final").unwrap();
    let to_a = b.generate_delta(&envs[0].current_version_vector());
    assert_eq!(to_a.iter_counters().count(), 0);
    a.merge(&to_a);
    assert_eq!(a.get_lww_string("title"), Some("final"));
    assert_eq!(a, b);
}

#[test]
fn test_merge_advances_local_clock() {
    let envs = replica_envs(&["A", "B"]);
    let mut a = LwwMap::new(envs[0].clone());
    let mut b = LwwMap::new(envs[1].clone());

    for i in 0..10 {
        a.put("k", i).unwrap();
    }
    b.merge(&a);

    // B's next write must order after everything it has seen from A
    b.put("k", 100).unwrap();
    a.merge(&b);
    assert_eq!(a.get_integer("k"), Some(100));
}
