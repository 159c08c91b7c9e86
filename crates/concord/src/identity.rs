//! Instance identity resolution.
//!
//! Every generator embeds a small instance number in the IDs it emits so that
//! two processes generating at the same instant cannot collide. The number is
//! derived once from the host (by default from the low 16 bits of its IPv4
//! address) and then shared by every generator built from the same
//! [`InstanceIdentity`].
//!
//! Each generator narrows the raw value to its own field width, so one
//! provider can feed both a bit-packed and a decimal-packed generator.

use crate::error::{Error, Result};
use core::net::{IpAddr, Ipv4Addr, SocketAddr};
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::OnceLock;

/// Something that can produce the raw identity of the running instance.
pub trait IdentitySource {
    /// Resolves the raw identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityUnavailable`] if the source has nothing to
    /// offer (e.g. the host has no usable IPv4 address).
    fn resolve(&self) -> Result<u32>;
}

impl<F> IdentitySource for F
where
    F: Fn() -> Result<u32>,
{
    fn resolve(&self) -> Result<u32> {
        self()
    }
}

/// A fixed identity, for explicit configuration and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fixed(pub u32);

impl IdentitySource for Fixed {
    fn resolve(&self) -> Result<u32> {
        Ok(self.0)
    }
}

/// Derives the identity from the lowest two bytes of the host's outbound
/// IPv4 address.
///
/// The address is discovered by "connecting" an unbound UDP socket to a
/// probe address and reading back the local end. UDP connect only selects a
/// route; no packet leaves the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostAddress {
    probe: SocketAddr,
}

impl Default for HostAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAddress {
    /// Probes the route towards a private-range address.
    pub const fn new() -> Self {
        Self::with_probe(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(10, 255, 255, 255)),
            1,
        ))
    }

    /// Probes the route towards `probe` instead of the default address.
    pub const fn with_probe(probe: SocketAddr) -> Self {
        Self { probe }
    }

    fn local_ipv4(&self) -> std::io::Result<Option<Ipv4Addr>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(self.probe)?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(Some(ip)),
            _ => Ok(None),
        }
    }
}

impl IdentitySource for HostAddress {
    fn resolve(&self) -> Result<u32> {
        match self.local_ipv4() {
            Ok(Some(ip)) => Ok(low_two_bytes(ip)),
            Ok(None) => Err(Error::IdentityUnavailable {
                reason: "no IPv4 address routes to the probe".into(),
            }),
            Err(e) => Err(Error::IdentityUnavailable {
                reason: format!("cannot determine host address: {e}"),
            }),
        }
    }
}

/// Returns `c.d` of `a.b.c.d` as a 16-bit value.
pub const fn low_two_bytes(ip: Ipv4Addr) -> u32 {
    let [_, _, c, d] = ip.octets();
    ((c as u32) << 8) | d as u32
}

/// Lazily resolved, process-wide instance identity.
///
/// Resolution happens at most once, on first use, with double-checked
/// locking: the common path is a lock-free read of a [`OnceLock`], and only
/// the first caller(s) take the mutex. A failed resolution is not cached, so
/// a later call may still succeed once the host has an address.
///
/// Build one provider at process start and pass it to every generator.
///
/// # Example
///
/// ```
/// use concord::{Fixed, InstanceIdentity};
///
/// let identity = InstanceIdentity::new(Fixed(0x0A0B));
/// assert_eq!(identity.get().unwrap(), 0x0A0B);
/// ```
#[derive(Debug)]
pub struct InstanceIdentity<S = HostAddress> {
    source: S,
    cached: OnceLock<u32>,
    init: Mutex<()>,
}

impl InstanceIdentity<HostAddress> {
    /// An identity derived from the host's IPv4 address.
    pub fn host() -> Self {
        Self::new(HostAddress::new())
    }
}

impl<S> InstanceIdentity<S>
where
    S: IdentitySource,
{
    /// Creates a provider that resolves from `source` on first use.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Returns the identity, resolving it on first use.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when the identity has not been resolved
    /// yet and the source cannot produce one.
    pub fn get(&self) -> Result<u32> {
        if let Some(id) = self.cached.get() {
            return Ok(*id);
        }

        let _guard = self.init.lock();
        if let Some(id) = self.cached.get() {
            return Ok(*id);
        }

        let id = self.source.resolve()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(instance = id, "resolved instance identity");
        // Only writer: we hold `init`.
        let _ = self.cached.set(id);
        Ok(id)
    }
}
