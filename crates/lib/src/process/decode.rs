//! Incremental UTF-8 decoding of output chunks.

/// Decodes a byte stream that arrives in arbitrary chunks.
///
/// A multi-byte character split across two chunks is held back until the
/// rest of it arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct StreamDecoder {
  pending: Vec<u8>,
}

impl StreamDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Decode the next chunk, returning all text that is complete so far.
  pub fn decode(&mut self, chunk: &[u8]) -> String {
    self.pending.extend_from_slice(chunk);

    let mut out = String::new();
    let mut rest: &[u8] = &self.pending;

    loop {
      match std::str::from_utf8(rest) {
        Ok(valid) => {
          out.push_str(valid);
          rest = &[];
          break;
        }
        Err(err) => {
          let (valid, after) = rest.split_at(err.valid_up_to());
          out.push_str(&String::from_utf8_lossy(valid));

          match err.error_len() {
            Some(len) => {
              out.push(char::REPLACEMENT_CHARACTER);
              rest = &after[len..];
            }
            // Truncated sequence at the end: wait for more bytes.
            None => {
              rest = after;
              break;
            }
          }
        }
      }
    }

    self.pending = rest.to_vec();
    out
  }

  /// Flush whatever is still pending once the stream has ended.
  pub fn finish(&mut self) -> String {
    let pending = std::mem::take(&mut self.pending);
    String::from_utf8_lossy(&pending).into_owned()
  }
}
