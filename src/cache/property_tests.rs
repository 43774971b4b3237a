//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the LRU store against a simple reference model.

use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::cache::LruStore;

// == Strategies ==
/// Small key space so operations collide often
fn key_strategy() -> impl Strategy<Value = u8> {
    0u8..24
}

#[derive(Debug, Clone)]
enum StoreOp {
    Put { key: u8, value: u32 },
    Get { key: u8 },
    Remove { key: u8 },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (key_strategy(), any::<u32>()).prop_map(|(key, value)| StoreOp::Put { key, value }),
        2 => key_strategy().prop_map(|key| StoreOp::Get { key }),
        1 => key_strategy().prop_map(|key| StoreOp::Remove { key }),
    ]
}

// == Reference Model ==
/// Recency order kept in a VecDeque (front = most recent), O(n) but obviously right.
#[derive(Debug, Default)]
struct ModelLru {
    capacity: usize,
    order: VecDeque<(u8, u32)>,
}

impl ModelLru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
        }
    }

    fn position(&self, key: u8) -> Option<usize> {
        self.order.iter().position(|(k, _)| *k == key)
    }

    fn put(&mut self, key: u8, value: u32) {
        if let Some(pos) = self.position(key) {
            self.order.remove(pos);
        } else if self.order.len() >= self.capacity {
            self.order.pop_back();
        }
        self.order.push_front((key, value));
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let pos = self.position(key)?;
        let entry = self.order.remove(pos)?;
        self.order.push_front(entry);
        Some(entry.1)
    }

    fn remove(&mut self, key: u8) -> bool {
        match self.position(key) {
            Some(pos) => self.order.remove(pos).is_some(),
            None => false,
        }
    }

    fn keys(&self) -> Vec<u8> {
        self.order.iter().map(|(k, _)| *k).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // For any operation sequence, the store agrees with the reference model
    // on every result and on the final recency order.
    #[test]
    fn prop_matches_reference_model(
        capacity in 1usize..10,
        ops in prop::collection::vec(store_op_strategy(), 1..200)
    ) {
        let store = LruStore::new(capacity);
        let mut model = ModelLru::new(capacity);

        for op in ops {
            match op {
                StoreOp::Put { key, value } => {
                    store.put(key, value);
                    model.put(key, value);
                }
                StoreOp::Get { key } => {
                    prop_assert_eq!(store.get(&key), model.get(key));
                }
                StoreOp::Remove { key } => {
                    prop_assert_eq!(store.remove(&key), model.remove(key));
                }
            }
            prop_assert!(store.len() <= capacity);
        }

        prop_assert_eq!(store.keys_by_recency(), model.keys());
    }

    // Inserting capacity + 1 distinct keys evicts exactly the first one.
    #[test]
    fn prop_overflow_evicts_oldest(capacity in 1usize..32) {
        let store = LruStore::new(capacity);
        for key in 0..capacity {
            prop_assert!(store.put(key, key).is_none());
        }

        let evicted = store.put(capacity, capacity);
        prop_assert_eq!(evicted, Some((0, 0)));
        prop_assert_eq!(store.len(), capacity);
        prop_assert!(!store.contains(&0));
    }

    // A read promotes: the key read last survives the next overflow.
    #[test]
    fn prop_get_promotes(capacity in 2usize..32, touched in any::<prop::sample::Index>()) {
        let store = LruStore::new(capacity);
        for key in 0..capacity {
            store.put(key, key);
        }

        let touched = touched.index(capacity);
        store.get(&touched);
        store.put(capacity, capacity);

        prop_assert!(store.contains(&touched));
        let expected_victim = if touched == 0 { 1 } else { 0 };
        prop_assert!(!store.contains(&expected_victim));
    }
}

// Fewer cases for the threaded stress property
proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    // Under concurrent get/put from many threads, size never exceeds capacity
    // and no key appears twice in the recency order.
    #[test]
    fn prop_concurrent_size_bound(
        capacity in 1usize..16,
        ops in prop::collection::vec(store_op_strategy(), 50..150)
    ) {
        let store = Arc::new(LruStore::new(capacity));
        let ops = Arc::new(ops);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let ops = Arc::clone(&ops);
                std::thread::spawn(move || {
                    let mut max_seen = 0;
                    for op in ops.iter() {
                        match op {
                            StoreOp::Put { key, value } => {
                                store.put(*key, *value);
                            }
                            StoreOp::Get { key } => {
                                store.get(key);
                            }
                            StoreOp::Remove { key } => {
                                store.remove(key);
                            }
                        }
                        max_seen = max_seen.max(store.len());
                    }
                    max_seen
                })
            })
            .collect();

        for handle in handles {
            let max_seen = handle.join().unwrap();
            prop_assert!(max_seen <= capacity);
        }

        let order = store.keys_by_recency();
        let unique: HashSet<_> = order.iter().copied().collect();
        prop_assert_eq!(order.len(), unique.len());
        prop_assert_eq!(order.len(), store.len());
    }
}
