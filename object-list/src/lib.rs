//! A FIFO list whose elements can also be removed from the middle in O(1).
//!
//! Every inserted element gets a [`Handle`]. The handle stays valid until the
//! element leaves the list, after which it is rejected: slots carry a
//! generation that is bumped on every removal, so a stale handle never aliases
//! a newer element that reused the same slot.

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Handle {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    generation: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct ObjectList<T> {
    nodes: Vec<Node<T>>,
    //空闲槽位
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> ObjectList<T> {
    pub fn new() -> Self {
        ObjectList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, element: T) -> Handle {
        let index = match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.value = Some(element);
                node.prev = self.tail;
                node.next = None;
                index
            }
            None => {
                self.nodes.push(Node {
                    value: Some(element),
                    generation: 0,
                    prev: self.tail,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        Handle {
            index,
            generation: self.nodes[index].generation,
        }
    }

    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|index| self.nodes[index].value.as_ref())
    }

    pub fn front_handle(&self) -> Option<Handle> {
        self.head.map(|index| Handle {
            index,
            generation: self.nodes[index].generation,
        })
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.unlink(head)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.nodes
            .get(handle.index)
            .map_or(false, |node| node.generation == handle.generation && node.value.is_some())
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        if !self.contains(handle) {
            return None;
        }
        self.nodes[handle.index].value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if !self.contains(handle) {
            return None;
        }
        self.nodes[handle.index].value.as_mut()
    }

    /// Removes the element behind `handle`, or returns `None` if it already left.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        self.unlink(handle.index)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, index: usize) -> Option<T> {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[index];
        node.prev = None;
        node.next = None;
        node.generation = node.generation.wrapping_add(1);
        let value = node.value.take();
        self.free.push(index);
        self.len -= 1;
        value
    }
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        ObjectList::new()
    }
}

pub struct Iter<'a, T> {
    list: &'a ObjectList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.list.nodes[index];
        self.cursor = node.next;
        node.value.as_ref()
    }
}
