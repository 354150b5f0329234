//! 随机令牌生成
//! Random token generation

use rand::Rng;

const BASE64_ALPHABET: &[u8; 64] =
  b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// 生成 `length` 个字符的随机 base64 字母表字符串
/// Generate a random string of `length` characters from the base64 alphabet
///
/// 每个字符携带 6 位熵，10 个字符即 60 位，足以充当不可伪造的锁令牌。
/// Each character carries 6 bits of entropy, so 10 characters give 60 bits,
/// enough for an unforgeable lock token.
pub fn base64(length: usize) -> String {
  let mut rng = rand::thread_rng();

  (0..length)
    .map(|_| BASE64_ALPHABET[rng.gen_range(0..BASE64_ALPHABET.len())] as char)
    .collect()
}
