//! Trace wire format between the front-end recorder and the core (spec.md §6).
//!
//! Binary, little-endian record framing; grounded on the teacher's
//! `soc/memory/buffer.rs`-adjacent raw byte-cursor style (this crate has no
//! precedent for tagged binary records, since the teacher reads RISC-V ELF
//! images through the `object` crate rather than a custom wire format). Only
//! the record/packet shapes and round-trip codec are in scope; the actual
//! file-reader loop is out of scope (spec.md §6 describes the wire, not a
//! reader implementation).

use crate::common::{MemOpKind, SimError, SimResult};
use crate::time::Time;

/// Magic value prefixing every trace file header.
pub const TRACE_MAGIC: u32 = 0x5454_FF00;

/// Granularity at which an I-cache page upload is emitted.
pub const ICACHE_PAGE_SIZE: usize = 4096;

/// Trace file header (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceHeader {
    pub header_size: u32,
    pub zlib_framed: bool,
    pub arch_32bit: bool,
}

impl TraceHeader {
    pub fn to_bytes(self) -> Vec<u8> {
        let mut options = 0u8;
        if self.zlib_framed {
            options |= 0b01;
        }
        if self.arch_32bit {
            options |= 0b10;
        }
        let mut out = Vec::with_capacity(9);
        out.extend_from_slice(&TRACE_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.push(options);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> SimResult<Self> {
        if bytes.len() < 9 {
            return Err(SimError::TraceDesync("header shorter than 9 bytes".into()));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != TRACE_MAGIC {
            return Err(SimError::TraceDesync(format!("bad trace magic {magic:#x}")));
        }
        let header_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let options = bytes[8];
        Ok(Self {
            header_size,
            zlib_framed: options & 0b01 != 0,
            arch_32bit: options & 0b10 != 0,
        })
    }
}

/// One record in the trace stream (spec.md §6 record table). The
/// `MemoryRequest`/`MemoryResponse` pair implements the round-trip memory
/// access protocol; all other variants are one-way front-end -> core.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceRecord {
    /// Code 0: virtual address inferred from the previous record's
    /// `last_addr + last_size` by the reader, not carried on the wire.
    SimpleInstruction {
        size: u8,
        num_addresses: u8,
        is_branch: bool,
        taken: bool,
    },
    /// Code 1.
    ExtendedInstruction {
        address: u64,
        size: u8,
        num_addresses: u8,
        is_branch: bool,
        taken: bool,
        is_predicate: bool,
        executed: bool,
    },
    /// Code 2: `4096` bytes of code starting at `base_addr`.
    IcachePageUpload { base_addr: u64, code: Vec<u8> },
    /// Code 3.
    Output { fd: u8, bytes: Vec<u8> },
    /// Code 4.
    SyscallRequest { syscall_number: u16, args: Vec<u8> },
    /// Code 5.
    NewThreadRequest,
    /// Code 6.
    JoinRequest { thread_id: u32 },
    /// Code 7.
    End,
    /// Code `0x80`: reply to `SyscallRequest`.
    SyscallResponse { retval: i64 },
    /// Code `0x81`: reply to `NewThreadRequest`.
    NewThreadResponse { thread_id: u32 },
    /// Code `0x82`: reply to `JoinRequest`.
    JoinResponse { success: bool },
    /// Code `0x83`: simulator -> recorder memory access request.
    MemoryRequest { addr: u64, size: u32, lock_type: u8, op: MemOpKind },
    /// Code `0x84`: recorder -> simulator reply, `data` present for loads.
    MemoryResponse { addr: u64, op: MemOpKind, data: Option<Vec<u8>> },
}

fn op_code(op: MemOpKind) -> u8 {
    match op {
        MemOpKind::Load => 0,
        MemOpKind::Store => 1,
        MemOpKind::Peek => 2,
    }
}

fn op_from_code(code: u8) -> SimResult<MemOpKind> {
    match code {
        0 => Ok(MemOpKind::Load),
        1 => Ok(MemOpKind::Store),
        2 => Ok(MemOpKind::Peek),
        other => Err(SimError::TraceDesync(format!("unknown mem op code {other}"))),
    }
}

impl TraceRecord {
    /// Serializes this record as `[code, payload...]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TraceRecord::SimpleInstruction { size, num_addresses, is_branch, taken } => {
                out.push(0);
                out.push(*size);
                out.push(*num_addresses);
                out.push((*is_branch as u8) | ((*taken as u8) << 1));
            }
            TraceRecord::ExtendedInstruction {
                address,
                size,
                num_addresses,
                is_branch,
                taken,
                is_predicate,
                executed,
            } => {
                out.push(1);
                out.extend_from_slice(&address.to_le_bytes());
                out.push(*size);
                out.push(*num_addresses);
                let flags = (*is_branch as u8) | ((*taken as u8) << 1) | ((*is_predicate as u8) << 2) | ((*executed as u8) << 3);
                out.push(flags);
            }
            TraceRecord::IcachePageUpload { base_addr, code } => {
                out.push(2);
                out.extend_from_slice(&base_addr.to_le_bytes());
                out.extend_from_slice(code);
            }
            TraceRecord::Output { fd, bytes } => {
                out.push(3);
                out.push(*fd);
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            TraceRecord::SyscallRequest { syscall_number, args } => {
                out.push(4);
                out.extend_from_slice(&syscall_number.to_le_bytes());
                out.extend_from_slice(&(args.len() as u32).to_le_bytes());
                out.extend_from_slice(args);
            }
            TraceRecord::NewThreadRequest => out.push(5),
            TraceRecord::JoinRequest { thread_id } => {
                out.push(6);
                out.extend_from_slice(&thread_id.to_le_bytes());
            }
            TraceRecord::End => out.push(7),
            TraceRecord::SyscallResponse { retval } => {
                out.push(0x80);
                out.extend_from_slice(&retval.to_le_bytes());
            }
            TraceRecord::NewThreadResponse { thread_id } => {
                out.push(0x81);
                out.extend_from_slice(&thread_id.to_le_bytes());
            }
            TraceRecord::JoinResponse { success } => {
                out.push(0x82);
                out.push(*success as u8);
            }
            TraceRecord::MemoryRequest { addr, size, lock_type, op } => {
                out.push(0x83);
                out.extend_from_slice(&addr.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
                out.push(*lock_type);
                out.push(op_code(*op));
            }
            TraceRecord::MemoryResponse { addr, op, data } => {
                out.push(0x84);
                out.extend_from_slice(&addr.to_le_bytes());
                out.push(op_code(*op));
                match data {
                    Some(d) => {
                        out.push(1);
                        out.extend_from_slice(&(d.len() as u32).to_le_bytes());
                        out.extend_from_slice(d);
                    }
                    None => out.push(0),
                }
            }
        }
        out
    }

    /// Parses one record from `bytes`, returning it and the number of bytes
    /// consumed.
    pub fn from_bytes(bytes: &[u8]) -> SimResult<(Self, usize)> {
        let code = *bytes.first().ok_or_else(|| SimError::TraceDesync("empty record".into()))?;
        let body = &bytes[1..];
        let need = |n: usize| -> SimResult<()> {
            if body.len() < n {
                Err(SimError::TraceDesync(format!("record code {code} truncated, needed {n} bytes, had {}", body.len())))
            } else {
                Ok(())
            }
        };
        match code {
            0 => {
                need(3)?;
                let flags = body[2];
                Ok((
                    TraceRecord::SimpleInstruction {
                        size: body[0],
                        num_addresses: body[1],
                        is_branch: flags & 1 != 0,
                        taken: flags & 0b10 != 0,
                    },
                    4,
                ))
            }
            1 => {
                need(11)?;
                let address = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let flags = body[10];
                Ok((
                    TraceRecord::ExtendedInstruction {
                        address,
                        size: body[8],
                        num_addresses: body[9],
                        is_branch: flags & 1 != 0,
                        taken: flags & 0b10 != 0,
                        is_predicate: flags & 0b100 != 0,
                        executed: flags & 0b1000 != 0,
                    },
                    12,
                ))
            }
            2 => {
                need(8 + ICACHE_PAGE_SIZE)?;
                let base_addr = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let code_bytes = body[8..8 + ICACHE_PAGE_SIZE].to_vec();
                Ok((TraceRecord::IcachePageUpload { base_addr, code: code_bytes }, 1 + 8 + ICACHE_PAGE_SIZE))
            }
            3 => {
                need(5)?;
                let fd = body[0];
                let len = u32::from_le_bytes(body[1..5].try_into().unwrap()) as usize;
                need(5 + len)?;
                let data = body[5..5 + len].to_vec();
                Ok((TraceRecord::Output { fd, bytes: data }, 1 + 5 + len))
            }
            4 => {
                need(6)?;
                let syscall_number = u16::from_le_bytes(body[0..2].try_into().unwrap());
                let len = u32::from_le_bytes(body[2..6].try_into().unwrap()) as usize;
                need(6 + len)?;
                let args = body[6..6 + len].to_vec();
                Ok((TraceRecord::SyscallRequest { syscall_number, args }, 1 + 6 + len))
            }
            5 => Ok((TraceRecord::NewThreadRequest, 1)),
            6 => {
                need(4)?;
                Ok((TraceRecord::JoinRequest { thread_id: u32::from_le_bytes(body[0..4].try_into().unwrap()) }, 5))
            }
            7 => Ok((TraceRecord::End, 1)),
            0x80 => {
                need(8)?;
                Ok((TraceRecord::SyscallResponse { retval: i64::from_le_bytes(body[0..8].try_into().unwrap()) }, 9))
            }
            0x81 => {
                need(4)?;
                Ok((TraceRecord::NewThreadResponse { thread_id: u32::from_le_bytes(body[0..4].try_into().unwrap()) }, 5))
            }
            0x82 => {
                need(1)?;
                Ok((TraceRecord::JoinResponse { success: body[0] != 0 }, 2))
            }
            0x83 => {
                need(14)?;
                let addr = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let size = u32::from_le_bytes(body[8..12].try_into().unwrap());
                Ok((
                    TraceRecord::MemoryRequest {
                        addr,
                        size,
                        lock_type: body[12],
                        op: op_from_code(body[13])?,
                    },
                    15,
                ))
            }
            0x84 => {
                need(10)?;
                let addr = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let op = op_from_code(body[8])?;
                let has_data = body[9] != 0;
                if has_data {
                    need(14)?;
                    let len = u32::from_le_bytes(body[10..14].try_into().unwrap()) as usize;
                    need(14 + len)?;
                    let data = body[14..14 + len].to_vec();
                    Ok((TraceRecord::MemoryResponse { addr, op, data: Some(data) }, 1 + 14 + len))
                } else {
                    Ok((TraceRecord::MemoryResponse { addr, op, data: None }, 11))
                }
            }
            other => Err(SimError::TraceDesync(format!("unknown record code {other:#x}"))),
        }
    }
}

/// Internal network packet wire fields (spec.md §6), distinct from the
/// recorder-facing [`TraceRecord`] stream.
#[derive(Clone, Debug, PartialEq)]
pub struct WirePacket {
    pub sender: i32,
    pub receiver: i32,
    pub kind: u16,
    pub time: Time,
    pub payload: Vec<u8>,
}

impl WirePacket {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.payload.len());
        out.extend_from_slice(&self.sender.to_le_bytes());
        out.extend_from_slice(&self.receiver.to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(&self.time.as_fs().to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> SimResult<Self> {
        if bytes.len() < 22 {
            return Err(SimError::TraceDesync("wire packet shorter than fixed header".into()));
        }
        let sender = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let receiver = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let kind = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
        let time = Time::from_fs(u64::from_le_bytes(bytes[10..18].try_into().unwrap()));
        let len = u32::from_le_bytes(bytes[18..22].try_into().unwrap()) as usize;
        if bytes.len() < 22 + len {
            return Err(SimError::TraceDesync("wire packet payload truncated".into()));
        }
        Ok(Self {
            sender,
            receiver,
            kind,
            time,
            payload: bytes[22..22 + len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = TraceHeader { header_size: 16, zlib_framed: true, arch_32bit: false };
        let bytes = h.to_bytes();
        assert_eq!(TraceHeader::from_bytes(&bytes).unwrap(), h);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let bytes = [0u8; 9];
        assert!(TraceHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn simple_instruction_round_trips() {
        let r = TraceRecord::SimpleInstruction { size: 4, num_addresses: 1, is_branch: true, taken: false };
        let bytes = r.to_bytes();
        let (decoded, consumed) = TraceRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn extended_instruction_round_trips() {
        let r = TraceRecord::ExtendedInstruction {
            address: 0xDEAD_BEEF,
            size: 4,
            num_addresses: 2,
            is_branch: true,
            taken: true,
            is_predicate: false,
            executed: true,
        };
        let bytes = r.to_bytes();
        let (decoded, consumed) = TraceRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn icache_page_upload_round_trips() {
        let r = TraceRecord::IcachePageUpload { base_addr: 0x1000, code: vec![0xAB; ICACHE_PAGE_SIZE] };
        let bytes = r.to_bytes();
        let (decoded, consumed) = TraceRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn memory_request_and_response_round_trip() {
        let req = TraceRecord::MemoryRequest { addr: 0x2000, size: 8, lock_type: 1, op: MemOpKind::Load };
        let (decoded, _) = TraceRecord::from_bytes(&req.to_bytes()).unwrap();
        assert_eq!(decoded, req);

        let resp = TraceRecord::MemoryResponse { addr: 0x2000, op: MemOpKind::Load, data: Some(vec![1, 2, 3, 4]) };
        let (decoded, _) = TraceRecord::from_bytes(&resp.to_bytes()).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn truncated_record_is_a_trace_desync_error() {
        let bytes = [4u8, 0, 0, 0, 0];
        assert!(TraceRecord::from_bytes(&bytes).is_err());
    }

    #[test]
    fn wire_packet_round_trips_including_broadcast() {
        let p = WirePacket { sender: 3, receiver: -1, kind: 2, time: Time::from_ns(42), payload: vec![9, 9, 9] };
        let bytes = p.to_bytes();
        assert_eq!(WirePacket::from_bytes(&bytes).unwrap(), p);
    }
}
