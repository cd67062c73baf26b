//! Kitty graphics protocol escape sequences.
//!
//! Only sequence construction lives here; the surface writes them after the
//! frame is drawn, with the cursor parked on the placement's top-left cell.

use std::borrow::Cow;
use std::io::Write as _;

/// Base64 payload bytes per APC chunk.
pub const CHUNK_SIZE: usize = 4096;

/// APC sequences that transmit a PNG and place it over `cols`×`rows` cells.
///
/// The first chunk carries the control keys; continuation chunks only `m`.
pub fn transmit_and_place(base64_png: &str, image_id: u32, cols: u16, rows: u16) -> Vec<Vec<u8>> {
    let data = base64_png.as_bytes();
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![&[][..]]
    } else {
        data.chunks(CHUNK_SIZE).collect()
    };
    let last = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let more = u8::from(i < last);
            let mut seq = Vec::with_capacity(chunk.len() + 80);
            // Writes into a Vec cannot fail.
            let _ = if i == 0 {
                write!(
                    seq,
                    "\x1b_Ga=T,f=100,q=2,i={image_id},c={cols},r={rows},C=1,z=1,m={more};"
                )
            } else {
                write!(seq, "\x1b_Gm={more};")
            };
            seq.extend_from_slice(chunk);
            seq.extend_from_slice(b"\x1b\\");
            seq
        })
        .collect()
}

/// Deletes every image placement on screen.
pub fn delete_all() -> Vec<u8> {
    b"\x1b_Ga=d,d=A,q=2\x1b\\".to_vec()
}

/// Wraps an APC in tmux's DCS passthrough (`ESC P tmux ; … ESC \`), doubling
/// every ESC inside, when `tmux` is set.
pub fn passthrough(payload: &[u8], tmux: bool) -> Cow<'_, [u8]> {
    if !tmux {
        return Cow::Borrowed(payload);
    }
    let mut wrapped = Vec::with_capacity(payload.len() + 64);
    wrapped.extend_from_slice(b"\x1bPtmux;");
    for &byte in payload {
        if byte == 0x1b {
            wrapped.push(0x1b);
        }
        wrapped.push(byte);
    }
    wrapped.extend_from_slice(b"\x1b\\");
    Cow::Owned(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk() {
        let seqs = transmit_and_place("QUJD", 3, 10, 4);
        assert_eq!(seqs.len(), 1);
        assert_eq!(
            seqs[0],
            b"\x1b_Ga=T,f=100,q=2,i=3,c=10,r=4,C=1,z=1,m=0;QUJD\x1b\\".to_vec()
        );
    }

    #[test]
    fn test_multi_chunk_sets_more_flag() {
        let payload = "A".repeat(CHUNK_SIZE * 2 + 10);
        let seqs = transmit_and_place(&payload, 1, 2, 2);
        assert_eq!(seqs.len(), 3);
        assert!(seqs[0].ends_with(b"\x1b\\"));
        assert!(String::from_utf8_lossy(&seqs[0]).contains("m=1;"));
        assert!(seqs[1].starts_with(b"\x1b_Gm=1;"));
        assert!(seqs[2].starts_with(b"\x1b_Gm=0;"));
    }

    #[test]
    fn test_tmux_passthrough_doubles_escapes() {
        let wrapped = passthrough(b"\x1b_Gx\x1b\\", true);
        assert_eq!(&*wrapped, b"\x1bPtmux;\x1b\x1b_Gx\x1b\x1b\\\x1b\\");
        assert_eq!(&*passthrough(b"abc", false), b"abc");
    }
}
