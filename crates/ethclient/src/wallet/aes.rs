use crate::errors::{ClientError, Result};
use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use zeroize::Zeroizing;

const BLOCK: usize = 16;

/// Left-pads `key` with ASCII `'0'` to the smallest AES key size that holds it.
fn pad_key(key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let size = match key.len() {
        0 => {
            return Err(ClientError::InvalidArgument(
                "aes key is empty, length must be in (0, 32]".to_owned(),
            ))
        }
        1..=16 => 16,
        17..=24 => 24,
        25..=32 => 32,
        n => {
            return Err(ClientError::InvalidArgument(format!(
                "aes key is {n} bytes, length must be in (0, 32]"
            )))
        }
    };
    let mut padded = Zeroizing::new(vec![b'0'; size - key.len()]);
    padded.extend_from_slice(key);
    Ok(padded)
}

fn key_error(e: impl std::fmt::Display) -> ClientError {
    ClientError::InvalidArgument(format!("aes key: {e}"))
}

/// AES-CBC with PKCS#7 padding. The IV is the first block of the padded key.
pub fn aes_cbc_encrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let key = pad_key(key)?;
    let iv = key.get(..BLOCK).ok_or_else(|| key_error("shorter than one block"))?;
    let out = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
    };
    Ok(out)
}

/// Inverse of [`aes_cbc_encrypt`]. A ciphertext that is not whole blocks or whose padding does
/// not check out is rejected.
pub fn aes_cbc_decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let key = pad_key(key)?;
    let iv = key.get(..BLOCK).ok_or_else(|| key_error("shorter than one block"))?;
    let out = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(&key, iv)
            .map_err(key_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    };
    out.map_err(|e| {
        ClientError::InvalidArgument(format!(
            "aes decrypt ({} bytes): {e}",
            ciphertext.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_hex(data: &str, key: &str) -> eyre::Result<String> {
        Ok(hex::encode(aes_cbc_encrypt(data.as_bytes(), key.as_bytes())?))
    }

    #[test]
    fn known_ciphertexts_for_each_key_size() -> eyre::Result<()> {
        // 30-byte key, padded to 32.
        assert_eq!(
            encrypt_hex("hello world", "123443211234432112341234123412")?,
            "b4d5046643ce63069802930629ad4a3b"
        );
        // 8-byte key, padded to 16.
        assert_eq!(
            encrypt_hex("hello world", "password")?,
            "9e973519a3b4622de3b27fa5360e7f62"
        );
        // 20-byte key, padded to 24.
        assert_eq!(
            encrypt_hex("seed material for a wallet!!", "0123456789abcdef0123")?,
            "1fc3e8d9824ecceb668817c1df0b3af29103c450041a4bd9cd442b68df6d36fd"
        );
        Ok(())
    }

    #[test]
    fn decrypt_inverts_encrypt() -> eyre::Result<()> {
        let key = b"123443211234432112341234123412";
        let ct = hex::decode("b4d5046643ce63069802930629ad4a3b")?;
        assert_eq!(aes_cbc_decrypt(&ct, key)?, b"hello world");

        let empty = aes_cbc_encrypt(b"", b"k")?;
        assert_eq!(empty.len(), 16, "empty input still gets a full padding block");
        assert_eq!(aes_cbc_decrypt(&empty, b"k")?, b"");
        Ok(())
    }

    #[test]
    fn key_length_bounds() {
        for key in [&b""[..], &[b'x'; 33][..]] {
            assert!(
                matches!(aes_cbc_encrypt(b"x", key), Err(ClientError::InvalidArgument(_))),
                "key of {} bytes must be rejected",
                key.len()
            );
            assert!(matches!(
                aes_cbc_decrypt(&[0; 16], key),
                Err(ClientError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn bad_ciphertext_is_an_error() -> eyre::Result<()> {
        assert!(aes_cbc_decrypt(&[0; 15], b"password").is_err(), "partial block");
        assert!(aes_cbc_decrypt(&[], b"password").is_err(), "no blocks");

        let mut ct = aes_cbc_encrypt(b"hello world", b"password")?;
        if let Some(last) = ct.last_mut() {
            *last ^= 0xff;
        }
        assert!(aes_cbc_decrypt(&ct, b"password").is_err(), "padding corrupted");
        Ok(())
    }
}
