#![cfg(not(feature = "loom"))]

use parmemo::{Key, Memo, MemoMap, Provider};

// 0-th element is never used.
const WEIGHTS: [i32; 51] = [
    0, 3851, 29521, 18550, 2453, 18807, 20622, 17505, 18855, 75601, 8657, 9411, 15447, 20454,
    96502, 56825, 15199, 25559, 56504, 95545, 8580, 8441, 48557, 41552, 10441, 15485, 35246, 4561,
    5451, 8759, 4771, 5647, 1834, 5537, 15234, 19375, 74982, 3452, 3314, 35453, 15583, 9853,
    11252, 2123, 5324, 7572, 3142, 6733, 25051, 26523, 15642,
];

const VALUES: [i32; 51] = [
    0, 124, 32, 15, 23, 8, 12, 34, 11, 23, 4, 41, 45, 87, 41, 52, 65, 71, 101, 25, 254, 415, 24,
    142, 98, 42, 46, 41, 99, 101, 52, 372, 34, 23, 102, 324, 31, 87, 23, 12, 87, 12, 54, 123, 45,
    12, 78, 231, 32, 12, 99,
];

const NUM_ITEMS: i32 = 50;
const CAPACITY: i32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    items: i32,
    weight: i32,
}

impl Key for State {
    fn hash1(&self) -> u64 {
        let mut hash = 2_166_136_261_u64;
        hash = hash.wrapping_mul(16_777_619) ^ self.items as u64;
        hash = hash.wrapping_mul(16_777_619) ^ self.weight as u64;
        hash
    }

    fn hash2(&self) -> u64 {
        ((self.items as u32).wrapping_mul(2_654_435_761) ^ self.weight as u32) as u64
    }
}

fn best_value(state: &State, prereqs: &Provider<State, i32, MemoMap<State, i32>>) -> i32 {
    if state.items == 0 {
        return 0;
    }
    let skipped = State {
        items: state.items - 1,
        weight: state.weight,
    };
    if WEIGHTS[state.items as usize] > state.weight {
        *prereqs.get(&skipped)
    } else {
        let taken = State {
            items: state.items - 1,
            weight: state.weight - WEIGHTS[state.items as usize],
        };
        let skip_value = *prereqs.get(&skipped);
        let take_value = *prereqs.get(&taken) + VALUES[state.items as usize];
        skip_value.max(take_value)
    }
}

#[test]
fn knapsack_reaches_the_known_optimum() {
    let memo: Memo<State, i32> =
        Memo::new(4, (NUM_ITEMS * CAPACITY) as usize, false).unwrap();
    let root = State {
        items: NUM_ITEMS,
        weight: CAPACITY,
    };
    let max_value = memo.get_or_compute(&root, best_value).unwrap();
    assert_eq!(max_value, 2_293);

    // Walk the decision table back to the selected item set, reading only
    // states the forward pass is guaranteed to have populated.
    let mut selected = Vec::new();
    let mut current_weight = CAPACITY;
    for item in (1..=NUM_ITEMS).rev() {
        let with_item = memo
            .get(&State {
                items: item,
                weight: current_weight,
            })
            .unwrap();
        let without_item = memo
            .get(&State {
                items: item - 1,
                weight: current_weight,
            })
            .unwrap();
        if with_item != without_item {
            selected.push(item);
            current_weight -= WEIGHTS[item as usize];
        }
    }

    let total_value: i32 = selected.iter().map(|&item| VALUES[item as usize]).sum();
    let total_weight: i32 = selected.iter().map(|&item| WEIGHTS[item as usize]).sum();
    assert_eq!(total_value, 2_293);
    assert!(total_weight <= CAPACITY);
}

#[test]
fn single_worker_agrees_on_a_smaller_instance() {
    let capacity = 10_000;
    let root = State {
        items: NUM_ITEMS,
        weight: capacity,
    };

    let parallel: Memo<State, i32> = Memo::new(4, 0, false).unwrap();
    let racing = parallel.get_or_compute(&root, best_value).unwrap();

    let serial: Memo<State, i32> = Memo::new(1, 0, false).unwrap();
    let inline = serial.get_or_compute(&root, best_value).unwrap();

    assert_eq!(racing, inline);
}
