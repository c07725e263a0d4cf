//! Thin façade over serial, in-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices*. Every primitive here is **blocking**:
//! it returns once the calling rank's part of the operation is complete. The
//! collective methods carry default algorithms built from `send`/`recv_into`;
//! those defaults assume `send` is buffered (it returns before the matching
//! receive is posted), which holds for [`LocalComm`]. [`MpiComm`] overrides every
//! collective with the native MPI call.

use crate::mesh_error::MeshDistError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Tags used by the default collective algorithms. User traffic should stay below 0xF000.
pub(crate) const SCATTER_TAG: CommTag = CommTag::new(0xF001);
pub(crate) const GATHER_TAG: CommTag = CommTag::new(0xF002);

/// Blocking communication interface shared by every fabric backend.
pub trait Communicator {
    /// Zero-based rank of the calling process.
    fn rank(&self) -> usize;
    /// Number of processes in this context.
    fn size(&self) -> usize;

    /// Collective: create an independent context over the same processes.
    ///
    /// Traffic on the duplicate never matches receives posted on `self`.
    fn duplicate(&self) -> Result<Box<dyn Communicator + '_>, MeshDistError>;

    /// Send `buf` to `peer`.
    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshDistError>;

    /// Receive one message from `peer` into `buf`, returning the number of bytes
    /// delivered. A message longer than `buf` is a `SizeMismatch`.
    fn recv_into(&self, peer: usize, tag: CommTag, buf: &mut [u8])
    -> Result<usize, MeshDistError>;

    /// Send `send` to `dest` and receive from `source` in one call.
    ///
    /// Returns the number of bytes received, which may be smaller than `recv.len()`.
    fn send_receive_into(
        &self,
        send: &[u8],
        dest: usize,
        recv: &mut [u8],
        source: usize,
        tag: CommTag,
    ) -> Result<usize, MeshDistError> {
        self.send(dest, tag, send)?;
        self.recv_into(source, tag, recv)
    }

    /// Scatter equal chunks of `send` (read on `root` only) so that rank `r`
    /// receives bytes `r * recv.len() .. (r + 1) * recv.len()` into `recv`.
    fn scatter_into(&self, root: usize, send: &[u8], recv: &mut [u8]) -> Result<(), MeshDistError> {
        let chunk = recv.len();
        if self.rank() == root {
            if send.len() != chunk * self.size() {
                return Err(MeshDistError::size_mismatch(
                    "scatter",
                    chunk * self.size(),
                    send.len(),
                ));
            }
            for peer in 0..self.size() {
                let part = &send[peer * chunk..(peer + 1) * chunk];
                if peer == root {
                    recv.copy_from_slice(part);
                } else {
                    self.send(peer, SCATTER_TAG, part)?;
                }
            }
            Ok(())
        } else {
            let got = self.recv_into(root, SCATTER_TAG, recv)?;
            expect_exact(root, got, chunk)
        }
    }

    /// Every rank contributes `send`; `recv` (of length `size * send.len()`)
    /// receives all contributions in rank order.
    fn all_gather_into(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshDistError> {
        let chunk = send.len();
        if recv.len() != chunk * self.size() {
            return Err(MeshDistError::size_mismatch(
                "all_gather",
                chunk * self.size(),
                recv.len(),
            ));
        }
        let me = self.rank();
        for peer in (0..self.size()).filter(|&p| p != me) {
            self.send(peer, GATHER_TAG, send)?;
        }
        for peer in 0..self.size() {
            let slot = &mut recv[peer * chunk..(peer + 1) * chunk];
            if peer == me {
                slot.copy_from_slice(send);
            } else {
                let got = self.recv_into(peer, GATHER_TAG, slot)?;
                expect_exact(peer, got, chunk)?;
            }
        }
        Ok(())
    }

    /// Maximum of `value` over all ranks, delivered to every rank.
    fn all_reduce_max(&self, value: u64) -> Result<u64, MeshDistError> {
        let mut all = vec![0u8; 8 * self.size()];
        self.all_gather_into(&value.to_le_bytes(), &mut all)?;
        Ok(all
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .max()
            .unwrap_or(value))
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), MeshDistError> {
        self.all_reduce_max(0).map(|_| ())
    }
}

fn expect_exact(peer: usize, got: usize, expected: usize) -> Result<(), MeshDistError> {
    if got == expected {
        Ok(())
    } else {
        Err(MeshDistError::CommError {
            neighbor: peer,
            message: format!("expected {expected} bytes, got {got}"),
        })
    }
}

/// Single-process communicator: no fabric, rank 0 of 1.
///
/// Point-to-point calls only make sense to self, and only through
/// `send_receive_into`; a lone `send` or `recv_into` would never complete.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn duplicate(&self) -> Result<Box<dyn Communicator + '_>, MeshDistError> {
        Ok(Box::new(NoComm))
    }
    fn send(&self, peer: usize, _tag: CommTag, _buf: &[u8]) -> Result<(), MeshDistError> {
        check_peer(peer, 1)?;
        Err(MeshDistError::FabricUnavailable { call: "send" })
    }
    fn recv_into(
        &self,
        peer: usize,
        _tag: CommTag,
        _buf: &mut [u8],
    ) -> Result<usize, MeshDistError> {
        check_peer(peer, 1)?;
        Err(MeshDistError::FabricUnavailable { call: "recv" })
    }
    fn send_receive_into(
        &self,
        send: &[u8],
        dest: usize,
        recv: &mut [u8],
        source: usize,
        _tag: CommTag,
    ) -> Result<usize, MeshDistError> {
        check_peer(dest, 1)?;
        check_peer(source, 1)?;
        if send.len() > recv.len() {
            return Err(MeshDistError::size_mismatch(
                "send_receive",
                recv.len(),
                send.len(),
            ));
        }
        recv[..send.len()].copy_from_slice(send);
        Ok(send.len())
    }
    fn scatter_into(&self, root: usize, send: &[u8], recv: &mut [u8]) -> Result<(), MeshDistError> {
        check_peer(root, 1)?;
        if send.len() != recv.len() {
            return Err(MeshDistError::size_mismatch("scatter", recv.len(), send.len()));
        }
        recv.copy_from_slice(send);
        Ok(())
    }
    fn all_gather_into(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshDistError> {
        if send.len() != recv.len() {
            return Err(MeshDistError::size_mismatch("all_gather", send.len(), recv.len()));
        }
        recv.copy_from_slice(send);
        Ok(())
    }
    fn all_reduce_max(&self, value: u64) -> Result<u64, MeshDistError> {
        Ok(value)
    }
    fn barrier(&self) -> Result<(), MeshDistError> {
        Ok(())
    }
}

pub(crate) fn check_peer(peer: usize, size: usize) -> Result<(), MeshDistError> {
    if peer < size {
        Ok(())
    } else {
        Err(MeshDistError::InvalidRank { rank: peer, size })
    }
}

// --- LocalComm: in-process ranks on threads ---
type Key = (u32, usize, usize, u16); // (context, src, dst, tag)

#[derive(Default)]
struct ContextTable {
    last: u32,
    // (parent, n-th duplicate) -> (context, ranks that have claimed it)
    issued: HashMap<(u32, u32), (u32, usize)>,
    // (context, rank) -> duplicates taken so far
    taken: HashMap<(u32, usize), u32>,
}

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
    contexts: Mutex<ContextTable>,
}

/// A set of in-process ranks sharing one mailbox.
///
/// Hand one [`LocalComm`] (or [`FabricHandle`](crate::fabric::FabricHandle)) to
/// each thread; the threads then behave like the ranks of a parallel job.
#[derive(Clone)]
pub struct LocalFabric {
    mailbox: Arc<Mailbox>,
    size: usize,
    timeout: Option<Duration>,
}

impl LocalFabric {
    pub fn new(size: usize) -> Result<Self, MeshDistError> {
        if size == 0 {
            return Err(MeshDistError::InvalidRank { rank: 0, size: 0 });
        }
        Ok(Self {
            mailbox: Arc::new(Mailbox::default()),
            size,
            timeout: None,
        })
    }

    /// Bound every receive by `timeout`; an expired receive reports a
    /// `ProtocolViolation` instead of blocking forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// World endpoint for `rank`.
    pub fn endpoint(&self, rank: usize) -> Result<LocalComm, MeshDistError> {
        check_peer(rank, self.size)?;
        Ok(LocalComm {
            mailbox: Arc::clone(&self.mailbox),
            context: 0,
            rank,
            size: self.size,
            timeout: self.timeout,
        })
    }

    /// World endpoints for every rank, in rank order.
    pub fn endpoints(&self) -> Vec<LocalComm> {
        (0..self.size)
            .filter_map(|rank| self.endpoint(rank).ok())
            .collect()
    }
}

/// One rank's view of a [`LocalFabric`] context.
pub struct LocalComm {
    mailbox: Arc<Mailbox>,
    context: u32,
    rank: usize,
    size: usize,
    timeout: Option<Duration>,
}

impl LocalComm {
    /// Context id; distinct duplicates never share one.
    pub fn context(&self) -> u32 {
        self.context
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn duplicate(&self) -> Result<Box<dyn Communicator + '_>, MeshDistError> {
        let context = {
            let mut table = self.mailbox.contexts.lock();
            let ContextTable {
                last,
                issued,
                taken,
            } = &mut *table;
            let counter = taken.entry((self.context, self.rank)).or_insert(0);
            let nth = *counter;
            *counter += 1;
            let key = (self.context, nth);
            let (context, claimed) = issued.entry(key).or_insert_with(|| {
                *last += 1;
                (*last, 0)
            });
            let context = *context;
            *claimed += 1;
            if *claimed == self.size {
                issued.remove(&key);
            }
            context
        };
        log::trace!(
            "[rank {}] duplicated context {} -> {}",
            self.rank,
            self.context,
            context
        );
        Ok(Box::new(LocalComm {
            mailbox: Arc::clone(&self.mailbox),
            context,
            rank: self.rank,
            size: self.size,
            timeout: self.timeout,
        }))
    }

    fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshDistError> {
        check_peer(peer, self.size)?;
        let key = (self.context, self.rank, peer, tag.as_u16());
        self.mailbox
            .queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.mailbox.arrived.notify_all();
        log::trace!(
            "[rank {}] sent {} bytes to {} (ctx {}, tag {:#06x})",
            self.rank,
            buf.len(),
            peer,
            self.context,
            tag.as_u16()
        );
        Ok(())
    }

    fn recv_into(
        &self,
        peer: usize,
        tag: CommTag,
        buf: &mut [u8],
    ) -> Result<usize, MeshDistError> {
        check_peer(peer, self.size)?;
        let key = (self.context, peer, self.rank, tag.as_u16());
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut queues = self.mailbox.queues.lock();
        let msg = loop {
            if let Some(queue) = queues.get_mut(&key) {
                if let Some(msg) = queue.pop_front() {
                    if queue.is_empty() {
                        queues.remove(&key);
                    }
                    break msg;
                }
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(MeshDistError::ProtocolViolation(format!(
                            "rank {} timed out waiting for rank {} (tag {:#06x})",
                            self.rank,
                            peer,
                            tag.as_u16()
                        )));
                    }
                    self.mailbox.arrived.wait_until(&mut queues, deadline);
                }
                None => self.mailbox.arrived.wait(&mut queues),
            }
        };
        drop(queues);
        if msg.len() > buf.len() {
            return Err(MeshDistError::size_mismatch("recv", buf.len(), msg.len()));
        }
        buf[..msg.len()].copy_from_slice(&msg);
        Ok(msg.len())
    }
}

// A duplicated context lives exactly as long as its endpoints; messages still
// addressed to a dropped endpoint can never be received.
impl Drop for LocalComm {
    fn drop(&mut self) {
        if self.context == 0 {
            return;
        }
        let (context, rank) = (self.context, self.rank);
        let purged = {
            let mut queues = self.mailbox.queues.lock();
            let before = queues.len();
            queues.retain(|&(ctx, _, dst, _), _| ctx != context || dst != rank);
            before - queues.len()
        };
        self.mailbox.contexts.lock().taken.remove(&(context, rank));
        log::trace!("[rank {rank}] released context {context} ({purged} queues purged)");
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::point_to_point::send_receive_into_with_tags;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Communicator over an MPI context.
    pub struct MpiComm {
        comm: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(comm: SimpleCommunicator) -> Self {
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self { comm, rank, size }
        }

        fn checked(&self, peer: usize) -> Result<i32, MeshDistError> {
            check_peer(peer, self.size)?;
            Ok(peer as i32)
        }
    }

    fn received(status: mpi::point_to_point::Status) -> usize {
        status.count(u8::equivalent_datatype()).max(0) as usize
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn duplicate(&self) -> Result<Box<dyn Communicator + '_>, MeshDistError> {
            Ok(Box::new(MpiComm::new(self.comm.duplicate())))
        }

        fn send(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Result<(), MeshDistError> {
            self.comm
                .process_at_rank(self.checked(peer)?)
                .send_with_tag(buf, i32::from(tag.as_u16()));
            Ok(())
        }

        fn recv_into(
            &self,
            peer: usize,
            tag: CommTag,
            buf: &mut [u8],
        ) -> Result<usize, MeshDistError> {
            let status = self
                .comm
                .process_at_rank(self.checked(peer)?)
                .receive_into_with_tag(buf, i32::from(tag.as_u16()));
            Ok(received(status))
        }

        fn send_receive_into(
            &self,
            send: &[u8],
            dest: usize,
            recv: &mut [u8],
            source: usize,
            tag: CommTag,
        ) -> Result<usize, MeshDistError> {
            let tag = i32::from(tag.as_u16());
            let dest = self.comm.process_at_rank(self.checked(dest)?);
            let source = self.comm.process_at_rank(self.checked(source)?);
            let status = send_receive_into_with_tags(send, &dest, tag, recv, &source, tag);
            Ok(received(status))
        }

        fn scatter_into(
            &self,
            root: usize,
            send: &[u8],
            recv: &mut [u8],
        ) -> Result<(), MeshDistError> {
            let root_process = self.comm.process_at_rank(self.checked(root)?);
            if self.rank == root {
                if send.len() != recv.len() * self.size {
                    return Err(MeshDistError::size_mismatch(
                        "scatter",
                        recv.len() * self.size,
                        send.len(),
                    ));
                }
                root_process.scatter_into_root(send, recv);
            } else {
                root_process.scatter_into(recv);
            }
            Ok(())
        }

        fn all_gather_into(&self, send: &[u8], recv: &mut [u8]) -> Result<(), MeshDistError> {
            if recv.len() != send.len() * self.size {
                return Err(MeshDistError::size_mismatch(
                    "all_gather",
                    send.len() * self.size,
                    recv.len(),
                ));
            }
            self.comm.all_gather_into(send, recv);
            Ok(())
        }

        fn all_reduce_max(&self, value: u64) -> Result<u64, MeshDistError> {
            let mut global = 0u64;
            self.comm
                .all_reduce_into(&value, &mut global, SystemOperation::max());
            Ok(global)
        }

        fn barrier(&self) -> Result<(), MeshDistError> {
            self.comm.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn local_roundtrip_two_ranks() {
        let fabric = LocalFabric::new(2).unwrap();
        let comm0 = fabric.endpoint(0).unwrap();
        let comm1 = fabric.endpoint(1).unwrap();

        comm0.send(1, CommTag::new(7), &[1, 2, 3, 4]).unwrap();
        let mut recv_buf = [0u8; 8];
        let n = comm1.recv_into(0, CommTag::new(7), &mut recv_buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&recv_buf[..n], &[1, 2, 3, 4]);
    }

    #[test]
    fn local_tags_do_not_match_each_other() {
        let fabric = LocalFabric::new(2).unwrap();
        let (c0, c1) = (fabric.endpoint(0).unwrap(), fabric.endpoint(1).unwrap());
        c0.send(1, CommTag::new(0xB200), &[2]).unwrap();
        c0.send(1, CommTag::new(0xA100), &[1]).unwrap();
        let mut buf = [0u8; 1];
        c1.recv_into(0, CommTag::new(0xA100), &mut buf).unwrap();
        assert_eq!(buf, [1]);
        c1.recv_into(0, CommTag::new(0xB200), &mut buf).unwrap();
        assert_eq!(buf, [2]);
    }

    #[test]
    fn duplicates_are_isolated_and_agree_across_ranks() {
        let fabric = LocalFabric::new(2).unwrap();
        let (c0, c1) = (fabric.endpoint(0).unwrap(), fabric.endpoint(1).unwrap());
        let d0 = c0.duplicate().unwrap();
        let d1 = c1.duplicate().unwrap();

        d0.send(1, CommTag::new(1), &[9]).unwrap();
        c0.send(1, CommTag::new(1), &[5]).unwrap();

        let mut buf = [0u8; 1];
        c1.recv_into(0, CommTag::new(1), &mut buf).unwrap();
        assert_eq!(buf, [5]);
        d1.recv_into(0, CommTag::new(1), &mut buf).unwrap();
        assert_eq!(buf, [9]);
    }

    #[test]
    fn later_endpoints_get_fresh_contexts() {
        let fabric = LocalFabric::new(2).unwrap();
        {
            let (c0, c1) = (fabric.endpoint(0).unwrap(), fabric.endpoint(1).unwrap());
            let d0 = c0.duplicate().unwrap();
            d0.send(1, CommTag::new(5), b"stale").unwrap();
            let _d1 = c1.duplicate().unwrap();
            assert!(fabric.mailbox.contexts.lock().issued.is_empty());
        }
        // The unreceived message went away with rank 1's duplicate.
        assert!(fabric.mailbox.queues.lock().is_empty());

        let (c0, c1) = (fabric.endpoint(0).unwrap(), fabric.endpoint(1).unwrap());
        let d0 = c0.duplicate().unwrap();
        let d1 = c1.duplicate().unwrap();
        d0.send(1, CommTag::new(5), b"fresh").unwrap();
        let mut buf = [0u8; 8];
        let n = d1.recv_into(0, CommTag::new(5), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"fresh");
        assert!(fabric.mailbox.queues.lock().is_empty());
    }

    #[test]
    fn oversized_message_is_size_mismatch() {
        let fabric = LocalFabric::new(2).unwrap();
        let (c0, c1) = (fabric.endpoint(0).unwrap(), fabric.endpoint(1).unwrap());
        c0.send(1, CommTag::new(3), &[0; 16]).unwrap();
        let mut buf = [0u8; 4];
        let err = c1.recv_into(0, CommTag::new(3), &mut buf).unwrap_err();
        assert_eq!(
            err,
            MeshDistError::SizeMismatch {
                op: "recv",
                expected: 4,
                found: 16
            }
        );
    }

    #[test]
    fn receive_times_out_as_protocol_violation() {
        let fabric = LocalFabric::new(2)
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let c1 = fabric.endpoint(1).unwrap();
        let mut buf = [0u8; 1];
        let err = c1.recv_into(0, CommTag::new(1), &mut buf).unwrap_err();
        assert!(matches!(err, MeshDistError::ProtocolViolation(_)));
    }

    #[test]
    fn default_collectives_over_threads() {
        let fabric = LocalFabric::new(3).unwrap();
        let results: Vec<(Vec<u8>, u64)> = thread::scope(|s| {
            let handles: Vec<_> = fabric
                .endpoints()
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let me = comm.rank() as u8;
                        let mut gathered = [0u8; 3];
                        comm.all_gather_into(&[me * 10], &mut gathered).unwrap();
                        let max = comm.all_reduce_max(u64::from(me) + 4).unwrap();
                        comm.barrier().unwrap();
                        (gathered.to_vec(), max)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (gathered, max) in results {
            assert_eq!(gathered, vec![0, 10, 20]);
            assert_eq!(max, 6);
        }
    }

    #[test]
    fn no_comm_send_receive_to_self_copies() {
        let comm = NoComm;
        let mut recv = [0u8; 4];
        let n = comm
            .send_receive_into(&[7, 8], 0, &mut recv, 0, CommTag::new(1))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(&recv[..2], &[7, 8]);
        assert_eq!(
            comm.send(0, CommTag::new(1), &[1]),
            Err(MeshDistError::FabricUnavailable { call: "send" })
        );
        assert_eq!(
            comm.send(1, CommTag::new(1), &[1]),
            Err(MeshDistError::InvalidRank { rank: 1, size: 1 })
        );
    }
}
