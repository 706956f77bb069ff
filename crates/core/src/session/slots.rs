/// Fixed-capacity arena with generation-checked slots.
///
/// Allocation takes the first free slot; the slot vector never grows past
/// the capacity given at construction.
#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    len: usize,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> SlotTable<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self { slots, len: 0 }
    }

    pub(crate) fn insert(&mut self, value: T) -> Option<(usize, u32)> {
        self.insert_with(|_, _| value)
    }

    /// Insert a value built from the handle it will live under.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(usize, u32) -> T) -> Option<(usize, u32)> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())?;
        slot.value = Some(make(index, slot.generation));
        self.len += 1;
        Some((index, slot.generation))
    }

    pub(crate) fn get(&self, index: usize, generation: u32) -> Option<&T> {
        self.slots
            .get(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, index: usize, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn remove(&mut self, index: usize, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Some(value)
    }

    /// Occupied slots as `(index, generation, value)`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.value.as_ref().map(|v| (index, slot.generation, v)))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}
