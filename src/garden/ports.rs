// ABOUTME: Host port pool scanned lowest-first over a fixed range.
// ABOUTME: Ports return to the pool only when their owning pod is deleted.

use parking_lot::Mutex;
use std::collections::BTreeSet;

pub const PORT_RANGE_START: u16 = 62000;
pub const PORT_RANGE_END: u16 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient host ports: requested {requested}, {available} available")]
pub struct PortsExhausted {
    pub requested: usize,
    pub available: usize,
}

/// Inclusive range of host ports handed out to pod containers.
#[derive(Debug)]
pub struct PortPool {
    start: u16,
    end: u16,
    allocated: Mutex<BTreeSet<u16>>,
}

impl Default for PortPool {
    fn default() -> Self {
        Self::with_range(PORT_RANGE_START, PORT_RANGE_END)
    }
}

impl PortPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            allocated: Mutex::new(BTreeSet::new()),
        }
    }

    fn free_ports<'a>(&self, allocated: &'a BTreeSet<u16>) -> impl Iterator<Item = u16> + 'a {
        (self.start..=self.end).filter(move |p| !allocated.contains(p))
    }

    /// Take the lowest free port.
    pub fn next(&self) -> Result<u16, PortsExhausted> {
        self.allocate(1).map(|ports| ports[0])
    }

    /// Take the `n` lowest free ports, or none of them.
    pub fn allocate(&self, n: usize) -> Result<Vec<u16>, PortsExhausted> {
        let mut allocated = self.allocated.lock();
        let ports: Vec<u16> = self.free_ports(&allocated).take(n).collect();
        if ports.len() < n {
            return Err(PortsExhausted {
                requested: n,
                available: ports.len(),
            });
        }
        allocated.extend(ports.iter().copied());
        Ok(ports)
    }

    /// Whether `port` falls inside the pool's range.
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Mark a port as held. Returns false when it already was, or when it lies
    /// outside the range.
    pub fn reserve(&self, port: u16) -> bool {
        if !self.contains(port) {
            return false;
        }
        self.allocated.lock().insert(port)
    }

    /// Free a port; unallocated ports are ignored.
    pub fn release(&self, port: u16) {
        self.allocated.lock().remove(&port);
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.allocated.lock().contains(&port)
    }

    pub fn available(&self) -> usize {
        let allocated = self.allocated.lock();
        (self.end as usize - self.start as usize + 1) - allocated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn releases_are_reused_lowest_first() {
        let pool = PortPool::new();
        assert_eq!(pool.next(), Ok(62000));
        assert_eq!(pool.next(), Ok(62001));

        pool.release(62000);
        assert_eq!(pool.next(), Ok(62000));
        assert_eq!(pool.next(), Ok(62002));
    }

    #[test]
    fn release_of_unallocated_port_is_a_noop() {
        let pool = PortPool::with_range(100, 101);
        pool.release(100);
        pool.release(5);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn exhaustion_allocates_nothing() {
        let pool = PortPool::with_range(100, 102);
        assert_eq!(pool.allocate(2), Ok(vec![100, 101]));
        assert_eq!(
            pool.allocate(2),
            Err(PortsExhausted {
                requested: 2,
                available: 1
            })
        );
        assert!(!pool.is_allocated(102));
        assert_eq!(pool.next(), Ok(102));
        assert!(pool.next().is_err());
    }

    #[test]
    fn reserve_ignores_out_of_range_ports() {
        let pool = PortPool::new();
        assert!(pool.reserve(62005));
        assert!(!pool.reserve(62005));
        assert!(!pool.reserve(8080));
        assert!(pool.is_allocated(62005));
        assert!(pool.contains(65535));
        assert!(!pool.contains(8080));
    }

    proptest! {
        #[test]
        fn allocations_never_overlap(ops in prop::collection::vec((1usize..4, any::<bool>()), 1..40)) {
            let pool = PortPool::with_range(1000, 1031);
            let mut held: Vec<u16> = Vec::new();

            for (n, release) in ops {
                if release && !held.is_empty() {
                    let port = held.remove(0);
                    pool.release(port);
                    continue;
                }
                if let Ok(ports) = pool.allocate(n) {
                    for p in ports {
                        prop_assert!(!held.contains(&p));
                        held.push(p);
                    }
                }
                prop_assert_eq!(pool.available(), 32 - held.len());
            }
        }
    }
}
