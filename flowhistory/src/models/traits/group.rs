use std::collections::{HashMap, HashSet};

use crate::models::traits::Id;

pub trait GroupById<T: Id> {
    /// Groups items by id. On duplicate ids the first occurrence wins.
    fn group_by_id(&self) -> HashMap<&str, &T>;
}

impl<T: Id> GroupById<T> for [T] {
    fn group_by_id(&self) -> HashMap<&str, &T> {
        let mut map: HashMap<&str, &T> = HashMap::with_capacity(self.len());

        for item in self {
            map.entry(item.id()).or_insert(item);
        }

        map
    }
}

pub trait Pluck {
    fn pluck_id_set(&self) -> HashSet<&str>;
}

impl<T: Id> Pluck for [T] {
    fn pluck_id_set(&self) -> HashSet<&str> {
        self.iter().map(|item| item.id()).collect()
    }
}
