//! HTTP/2 flow control
//!
//! A [`Window`] tracks both directions of one flow-control scope: the
//! credit the peer has granted us (`peer_*`, consumed when we send DATA)
//! and the credit we have granted the peer (consumed when DATA arrives).
//! The connection owns one window for stream 0 and every stream owns its
//! own.

use super::error::{Error, Result};
use super::settings::MAX_WINDOW_SIZE;
use super::DEFAULT_INITIAL_WINDOW_SIZE;

const MAX: i64 = MAX_WINDOW_SIZE as i64;

fn threshold_for(initial: i32) -> i32 {
    initial / 2 + 1
}

/// Flow-control balances for one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Receive window granted to the peer
    initial_size: i32,
    /// Bytes the peer may still send
    current_size: i32,
    /// Replenish once `current_size` falls to this
    threshold: i32,
    /// Send window granted by the peer
    peer_initial_size: i32,
    /// Bytes we may still send (negative after a SETTINGS shrink)
    peer_current_size: i32,
    peer_threshold: i32,
}

impl Window {
    /// Create a window with the given receive and send sizes
    pub fn new(initial_size: u32, peer_initial_size: u32) -> Self {
        let initial = initial_size.min(MAX_WINDOW_SIZE) as i32;
        let peer_initial = peer_initial_size.min(MAX_WINDOW_SIZE) as i32;
        Window {
            initial_size: initial,
            current_size: initial,
            threshold: threshold_for(initial),
            peer_initial_size: peer_initial,
            peer_current_size: peer_initial,
            peer_threshold: threshold_for(peer_initial),
        }
    }

    pub fn initial_size(&self) -> i32 {
        self.initial_size
    }

    pub fn current_size(&self) -> i32 {
        self.current_size
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn peer_initial_size(&self) -> i32 {
        self.peer_initial_size
    }

    pub fn peer_current_size(&self) -> i32 {
        self.peer_current_size
    }

    pub fn peer_threshold(&self) -> i32 {
        self.peer_threshold
    }

    /// Bytes that may be sent right now
    pub fn available_send(&self) -> usize {
        self.peer_current_size.max(0) as usize
    }

    /// Check if window can send specified amount
    pub fn can_send(&self, amount: usize) -> bool {
        amount <= self.available_send()
    }

    /// Charge an outgoing DATA payload
    ///
    /// Callers fragment to [`available_send`](Self::available_send) first;
    /// exceeding it is an error.
    pub fn consume_send(&mut self, amount: usize) -> Result<()> {
        if !self.can_send(amount) {
            return Err(Error::FlowControl(format!(
                "send of {} bytes exceeds window {}",
                amount, self.peer_current_size
            )));
        }
        self.peer_current_size -= amount as i32;
        Ok(())
    }

    /// Charge an incoming DATA payload
    ///
    /// Returns the WINDOW_UPDATE increment to send when the balance has
    /// fallen to the threshold; the balance is then reset to the initial
    /// size.
    pub fn consume_recv(&mut self, amount: usize) -> Result<Option<u32>> {
        if amount as i64 > self.current_size as i64 {
            return Err(Error::FlowControl(format!(
                "received {} bytes with only {} in window",
                amount, self.current_size
            )));
        }
        self.current_size -= amount as i32;
        Ok(self.replenish())
    }

    /// Refill the receive balance once it is at or below the threshold
    ///
    /// Returns the WINDOW_UPDATE increment that grants the refill.
    pub fn replenish(&mut self) -> Option<u32> {
        if self.current_size <= self.threshold && self.current_size < self.initial_size {
            let increment = (self.initial_size as i64 - self.current_size as i64) as u32;
            self.current_size = self.initial_size;
            return Some(increment);
        }
        None
    }

    /// Credit a received WINDOW_UPDATE
    pub fn apply_window_update(&mut self, increment: u32) -> Result<()> {
        if increment == 0 {
            return Err(Error::Protocol(
                "Window update increment must be non-zero".to_string(),
            ));
        }

        let new_size = self.peer_current_size as i64 + increment as i64;
        if new_size > MAX {
            return Err(Error::FlowControl(format!(
                "Window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        self.peer_current_size = new_size as i32;
        Ok(())
    }

    /// Apply the peer's new SETTINGS_INITIAL_WINDOW_SIZE
    pub fn update_peer_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let new_current = adjusted(self.peer_current_size, self.peer_initial_size, new_initial_size)?;
        self.peer_initial_size = new_initial_size as i32;
        self.peer_current_size = new_current;
        self.peer_threshold = threshold_for(self.peer_initial_size);
        Ok(())
    }

    /// Apply our own new SETTINGS_INITIAL_WINDOW_SIZE once acknowledged
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let new_current = adjusted(self.current_size, self.initial_size, new_initial_size)?;
        self.initial_size = new_initial_size as i32;
        self.current_size = new_current;
        self.threshold = threshold_for(self.initial_size);
        Ok(())
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::new(DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE)
    }
}

fn adjusted(current: i32, old_initial: i32, new_initial: u32) -> Result<i32> {
    if new_initial > MAX_WINDOW_SIZE {
        return Err(Error::FlowControl(format!(
            "Initial window size {} exceeds maximum (2^31-1)",
            new_initial
        )));
    }

    let new_current = current as i64 + new_initial as i64 - old_initial as i64;
    if new_current > MAX || new_current < i32::MIN as i64 {
        return Err(Error::FlowControl(format!(
            "New window size {} exceeds maximum (2^31-1)",
            new_current
        )));
    }
    Ok(new_current as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults() {
        let window = Window::default();
        assert_eq!(window.initial_size(), 65535);
        assert_eq!(window.current_size(), 65535);
        assert_eq!(window.threshold(), 32768);
        assert_eq!(window.peer_threshold(), 32768);
        assert_eq!(window.available_send(), 65535);
    }

    #[test]
    fn test_replenish_at_threshold() {
        let mut window = Window::default();
        let update = window.consume_recv(40000).unwrap();
        assert_eq!(update, Some(40000));
        assert_eq!(window.current_size(), 65535);
    }

    #[test]
    fn test_no_replenish_above_threshold() {
        let mut window = Window::default();
        assert_eq!(window.consume_recv(1000).unwrap(), None);
        assert_eq!(window.current_size(), 64535);

        // 65535 - 32767 = 32768 lands exactly on the threshold
        let mut window = Window::default();
        assert_eq!(window.consume_recv(32767).unwrap(), Some(32767));
    }

    #[test]
    fn test_recv_over_window() {
        let mut window = Window::new(100, 100);
        assert!(matches!(window.consume_recv(101), Err(Error::FlowControl(_))));
    }

    #[test]
    fn test_send_consume() {
        let mut window = Window::new(100, 100);
        window.consume_send(60).unwrap();
        assert_eq!(window.available_send(), 40);
        assert!(!window.can_send(41));
        assert!(window.consume_send(41).is_err());
        window.consume_send(40).unwrap();
        assert_eq!(window.available_send(), 0);

        // Empty frames need no credit
        window.consume_send(0).unwrap();
    }

    #[test]
    fn test_window_update() {
        let mut window = Window::new(100, 100);
        window.consume_send(50).unwrap();
        window.apply_window_update(100).unwrap();
        assert_eq!(window.peer_current_size(), 150);

        assert!(matches!(window.apply_window_update(0), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_window_update_overflow() {
        let mut window = Window::new(65535, 0x7FFFFFFF);
        assert!(matches!(window.apply_window_update(1), Err(Error::FlowControl(_))));
    }

    #[test]
    fn test_update_peer_initial_size() {
        let mut window = Window::new(65535, 100);
        window.consume_send(50).unwrap();

        window.update_peer_initial_size(200).unwrap();
        assert_eq!(window.peer_initial_size(), 200);
        assert_eq!(window.peer_current_size(), 150); // 50 + 100

        window.update_peer_initial_size(20).unwrap();
        assert_eq!(window.peer_current_size(), -30);
        assert_eq!(window.available_send(), 0);
    }

    #[test]
    fn test_update_peer_initial_size_overflow() {
        let mut window = Window::new(65535, 65535);
        window.apply_window_update(0x7FFFFFFF - 65535).unwrap();
        assert!(matches!(
            window.update_peer_initial_size(65536),
            Err(Error::FlowControl(_))
        ));
    }

    #[test]
    fn test_update_local_initial_size() {
        let mut window = Window::default();
        window.consume_recv(1000).unwrap();
        window.update_initial_size(16384).unwrap();
        assert_eq!(window.initial_size(), 16384);
        assert_eq!(window.current_size(), 15384);
        assert_eq!(window.threshold(), 8193);
        assert_eq!(window.replenish(), None);
    }

    #[test]
    fn test_replenish_after_shrink() {
        let mut window = Window::default();
        assert_eq!(window.consume_recv(30000).unwrap(), None);
        window.update_initial_size(16384).unwrap();
        assert_eq!(window.current_size(), -13616);

        assert_eq!(window.replenish(), Some(30000));
        assert_eq!(window.current_size(), 16384);
        assert_eq!(window.replenish(), None);
    }
}
