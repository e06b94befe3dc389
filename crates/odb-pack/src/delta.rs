//! Binary delta application.
//!
//! A delta is two LEB128 sizes (base, target) followed by opcodes:
//! `1xxxxxxx` copies a span of the base, `0nnnnnnn` (n > 0) inserts the next
//! `n` literal bytes, and `0x00` is reserved.

use crate::error::{PackError, PackResult};

/// Copy length used when a copy opcode carries no length bytes.
const DEFAULT_COPY_LEN: usize = 0x10000;

/// Rebuild a target buffer from `base` and a delta instruction stream.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> PackResult<Vec<u8>> {
    let mut pos = 0;
    let base_len = read_size(delta, &mut pos)?;
    if base_len != base.len() as u64 {
        return Err(PackError::malformed(
            "delta",
            format!("base length {base_len}, actual {}", base.len()),
        ));
    }
    let target_len = read_size(delta, &mut pos)?;
    let target_len = usize::try_from(target_len)
        .map_err(|_| PackError::malformed("delta", "target length overflows"))?;

    let mut out = Vec::with_capacity(target_len.min(1 << 24));
    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;

        if op & 0x80 != 0 {
            let mut offset = 0usize;
            for i in 0..4 {
                if op & (1 << i) != 0 {
                    offset |= (next_byte(delta, &mut pos)? as usize) << (8 * i);
                }
            }
            let mut len = 0usize;
            for i in 0..3 {
                if op & (0x10 << i) != 0 {
                    len |= (next_byte(delta, &mut pos)? as usize) << (8 * i);
                }
            }
            if len == 0 {
                len = DEFAULT_COPY_LEN;
            }
            let end = offset
                .checked_add(len)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| {
                    PackError::malformed(
                        "delta",
                        format!("copy {offset}+{len} outside base of {}", base.len()),
                    )
                })?;
            out.extend_from_slice(&base[offset..end]);
        } else if op != 0 {
            let n = op as usize;
            let literal = delta.get(pos..pos + n).ok_or_else(|| {
                PackError::malformed("delta", format!("insert of {n} bytes runs past end"))
            })?;
            out.extend_from_slice(literal);
            pos += n;
        } else {
            return Err(PackError::malformed("delta", "reserved opcode 0"));
        }

        if out.len() > target_len {
            return Err(PackError::malformed(
                "delta",
                format!("output exceeds declared target length {target_len}"),
            ));
        }
    }

    if out.len() != target_len {
        return Err(PackError::malformed(
            "delta",
            format!("produced {} bytes, declared {target_len}", out.len()),
        ));
    }
    Ok(out)
}

fn next_byte(data: &[u8], pos: &mut usize) -> PackResult<u8> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| PackError::malformed("delta", "truncated instruction"))?;
    *pos += 1;
    Ok(byte)
}

/// Little-endian base-128 size: 7 bits per byte, high bit continues.
fn read_size(data: &[u8], pos: &mut usize) -> PackResult<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = next_byte(data, pos)?;
        if shift > 63 {
            return Err(PackError::malformed("delta", "size varint too long"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}
