//! Typed collectives over any [`Communicator`].
//!
//! Values travel as their `bytemuck::Pod` bytes, so every rank taking part in a
//! call must use the same `T`. With a single process every operation here is a
//! local copy (or the identity) and never touches the communicator.
//!
//! All functions take `&dyn Communicator`; a `&ProcessGroup` coerces to that.

use crate::algs::communicator::{CommTag, Communicator, check_peer};
use crate::algs::wire::{cast_slice, cast_slice_mut};
use crate::mesh_error::MeshDistError;
use bytemuck::Pod;
use std::mem::size_of;

const SEND_RECV_TAG: CommTag = CommTag::new(0xF003);

/// Root hands one value to each rank; every rank returns a one-element vector.
///
/// `values` is read on `root` only and must hold exactly one value per rank.
/// A wrong length is reported before anything is sent.
pub fn scatter_one<T: Pod>(
    comm: &dyn Communicator,
    root: usize,
    values: Option<&[T]>,
) -> Result<Vec<T>, MeshDistError> {
    let size = comm.size();
    check_peer(root, size)?;
    let send: &[T] = if comm.rank() == root {
        let values = values.unwrap_or(&[]);
        if values.len() != size {
            return Err(MeshDistError::size_mismatch("scatter_one", size, values.len()));
        }
        values
    } else {
        &[]
    };
    if size == 1 {
        return Ok(vec![send[0]]);
    }
    let mut out = T::zeroed();
    comm.scatter_into(root, cast_slice(send), cast_slice_mut(std::slice::from_mut(&mut out)))?;
    Ok(vec![out])
}

/// Every rank contributes `values[rank]`; on return `values` holds all
/// contributions in rank order on every rank.
pub fn all_gather<T: Pod>(comm: &dyn Communicator, values: &mut [T]) -> Result<(), MeshDistError> {
    let size = comm.size();
    if values.len() != size {
        return Err(MeshDistError::size_mismatch("all_gather", size, values.len()));
    }
    if size == 1 {
        return Ok(());
    }
    let mine = values[comm.rank()];
    comm.all_gather_into(cast_slice(std::slice::from_ref(&mine)), cast_slice_mut(values))
}

/// Maximum of `value` over all ranks.
pub fn all_reduce_max(comm: &dyn Communicator, value: u64) -> Result<u64, MeshDistError> {
    if comm.size() == 1 {
        return Ok(value);
    }
    comm.all_reduce_max(value)
}

/// Send `send` to `dest` while receiving into `recv` from `source`.
///
/// Returns how many elements actually arrived. That count may be smaller than
/// `recv.len()`; callers must look at it rather than assume a full buffer.
pub fn send_receive<T: Pod>(
    comm: &dyn Communicator,
    send: &[T],
    dest: usize,
    recv: &mut [T],
    source: usize,
) -> Result<usize, MeshDistError> {
    let elem = size_of::<T>().max(1);
    let bytes =
        comm.send_receive_into(cast_slice(send), dest, cast_slice_mut(recv), source, SEND_RECV_TAG)?;
    if bytes % elem != 0 {
        return Err(MeshDistError::size_mismatch(
            "send_receive",
            bytes.next_multiple_of(elem),
            bytes,
        ));
    }
    Ok(bytes / elem)
}

/// Send `values[i]` to rank `partition[i]`.
///
/// Returns the values this rank received together with the rank each came from.
/// Values kept locally come first, then one block per ring step.
pub fn distribute<T: Pod>(
    comm: &dyn Communicator,
    values: &[T],
    partition: &[usize],
) -> Result<(Vec<T>, Vec<usize>), MeshDistError> {
    if values.len() != partition.len() {
        return Err(MeshDistError::size_mismatch(
            "distribute",
            values.len(),
            partition.len(),
        ));
    }
    let size = comm.size();
    let me = comm.rank();
    let mut outgoing: Vec<Vec<T>> = vec![Vec::new(); size];
    for (&value, &dest) in values.iter().zip(partition) {
        check_peer(dest, size)?;
        outgoing[dest].push(value);
    }

    let mut received = std::mem::take(&mut outgoing[me]);
    let mut sources = vec![me; received.len()];
    if size == 1 {
        return Ok((received, sources));
    }

    let longest = outgoing.iter().map(Vec::len).max().unwrap_or(0);
    let capacity = comm.all_reduce_max(longest as u64)? as usize;
    let mut buf = vec![T::zeroed(); capacity];
    for step in 1..size {
        let dest = (me + step) % size;
        let source = (me + size - step) % size;
        let n = send_receive(comm, &outgoing[dest], dest, &mut buf, source)?;
        received.extend_from_slice(&buf[..n]);
        sources.extend(std::iter::repeat_n(source, n));
    }
    log::trace!("[rank {me}] distribute received {} values", received.len());
    Ok((received, sources))
}

/// Block until every rank has arrived.
pub fn barrier(comm: &dyn Communicator) -> Result<(), MeshDistError> {
    if comm.size() == 1 {
        return Ok(());
    }
    comm.barrier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn single_process_scatter_copies() {
        let out = scatter_one(&NoComm, 0, Some(&[42u64][..])).unwrap();
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn single_process_scatter_checks_length() {
        let err = scatter_one(&NoComm, 0, Some(&[1u64, 2][..])).unwrap_err();
        assert_eq!(err, MeshDistError::size_mismatch("scatter_one", 1, 2));
    }

    #[test]
    fn single_process_gather_and_reduce_are_local() {
        let mut values = [7u32];
        all_gather(&NoComm, &mut values).unwrap();
        assert_eq!(values, [7]);
        assert_eq!(all_reduce_max(&NoComm, 13).unwrap(), 13);
        barrier(&NoComm).unwrap();
    }

    #[test]
    fn gather_rejects_wrong_slot_count() {
        let mut values = [1u32, 2];
        assert_eq!(
            all_gather(&NoComm, &mut values),
            Err(MeshDistError::size_mismatch("all_gather", 1, 2))
        );
    }

    #[test]
    fn send_receive_to_self_reports_short_count() {
        let mut recv = [0.0f64; 8];
        let n = send_receive(&NoComm, &[1.5, 2.5], 0, &mut recv, 0).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&recv[..n], &[1.5, 2.5]);
    }

    #[test]
    fn distribute_single_process_keeps_everything() {
        let (got, from) = distribute(&NoComm, &[3u64, 1, 2], &[0, 0, 0]).unwrap();
        assert_eq!(got, vec![3, 1, 2]);
        assert_eq!(from, vec![0, 0, 0]);
    }

    #[test]
    fn distribute_rejects_unknown_rank() {
        let err = distribute(&NoComm, &[3u64], &[2]).unwrap_err();
        assert_eq!(err, MeshDistError::InvalidRank { rank: 2, size: 1 });
    }
}
