/// Two slots of which one is labelled "old" and the other "new". Swapping
/// flips the labels and leaves both values where they are.
#[derive(Debug, Clone, Default)]
pub struct OldNew<T> {
    slots: [T; 2],
    first_is_old: bool,
}

impl<T> OldNew<T> {
    pub fn new(old: T, new: T) -> Self {
        Self {
            slots: [old, new],
            first_is_old: true,
        }
    }

    fn old_index(&self) -> usize {
        if self.first_is_old { 0 } else { 1 }
    }

    pub fn old(&self) -> &T {
        &self.slots[self.old_index()]
    }

    pub fn new_value(&self) -> &T {
        &self.slots[1 - self.old_index()]
    }

    pub fn old_mut(&mut self) -> &mut T {
        let index = self.old_index();
        &mut self.slots[index]
    }

    pub fn new_mut(&mut self) -> &mut T {
        let index = 1 - self.old_index();
        &mut self.slots[index]
    }

    /// Both slots, old first.
    pub fn get(&self) -> (&T, &T) {
        (self.old(), self.new_value())
    }

    pub fn swap(&mut self) {
        self.first_is_old = !self.first_is_old;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_relabels_without_moving() {
        let mut pair = OldNew::new(String::from("a"), String::from("b"));
        let old_ptr = pair.old().as_ptr();

        pair.swap();
        assert_eq!(pair.get(), (&String::from("b"), &String::from("a")));
        assert_eq!(pair.new_value().as_ptr(), old_ptr);

        pair.swap();
        assert_eq!(pair.old(), "a");
    }

    #[test]
    fn mutation_goes_to_labelled_slot() {
        let mut pair = OldNew::new(1, 2);
        pair.swap();
        *pair.old_mut() += 10;
        *pair.new_mut() += 100;
        assert_eq!(pair.get(), (&12, &101));
    }
}
