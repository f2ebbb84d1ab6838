//! Systematic Reed–Solomon code over GF(256) (primitive polynomial 0x11d,
//! generator roots α^0..α^(ecc-1)).

use std::sync::OnceLock;

const PRIMITIVE: u16 = 0x11d;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= PRIMITIVE;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        Tables { exp, log }
    })
}

fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

fn div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0);
    if a == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + 255 - t.log[b as usize] as usize]
}

/// α^power
fn alpha_pow(power: usize) -> u8 {
    tables().exp[power % 255]
}

/// Evaluate a polynomial stored highest degree first (Horner).
fn eval_be(poly: &[u8], x: u8) -> u8 {
    poly.iter().fold(0, |acc, &c| mul(acc, x) ^ c)
}

/// Evaluate a polynomial stored lowest degree first.
fn eval_le(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0, |acc, &c| mul(acc, x) ^ c)
}

/// RS code with `msg_len` data bytes followed by `ecc_len` parity bytes.
#[derive(Clone, Debug)]
pub struct ReedSolomon {
    msg_len: usize,
    ecc_len: usize,
    /// Generator polynomial, highest degree first, monic.
    generator: Vec<u8>,
}

impl ReedSolomon {
    pub fn new(msg_len: usize, ecc_len: usize) -> Self {
        assert!(msg_len + ecc_len <= 255, "codeword longer than 255 bytes");

        let mut generator = vec![1u8];
        for i in 0..ecc_len {
            // multiply by (x + α^i)
            let root = alpha_pow(i);
            let mut next = vec![0u8; generator.len() + 1];
            for (j, &g) in generator.iter().enumerate() {
                next[j] ^= g;
                next[j + 1] ^= mul(g, root);
            }
            generator = next;
        }

        Self {
            msg_len,
            ecc_len,
            generator,
        }
    }

    pub fn codeword_len(&self) -> usize {
        self.msg_len + self.ecc_len
    }

    /// Returns `msg` followed by its parity bytes.
    pub fn encode(&self, msg: &[u8]) -> Vec<u8> {
        assert_eq!(msg.len(), self.msg_len);

        let mut out = vec![0u8; self.codeword_len()];
        out[..self.msg_len].copy_from_slice(msg);
        for i in 0..self.msg_len {
            let coef = out[i];
            if coef == 0 {
                continue;
            }
            for (j, &g) in self.generator.iter().enumerate().skip(1) {
                out[i + j] ^= mul(g, coef);
            }
        }
        out[..self.msg_len].copy_from_slice(msg);
        out
    }

    /// Correct up to `ecc_len / 2` byte errors and return the message bytes,
    /// or `None` if the codeword is not correctable.
    pub fn decode(&self, codeword: &[u8]) -> Option<Vec<u8>> {
        if codeword.len() != self.codeword_len() {
            return None;
        }

        let syndromes = self.syndromes(codeword);
        if syndromes.iter().all(|&s| s == 0) {
            return Some(codeword[..self.msg_len].to_vec());
        }

        let locator = berlekamp_massey(&syndromes);
        let n_errors = locator.len() - 1;
        if 2 * n_errors > self.ecc_len {
            return None;
        }

        // Chien search: index `idx` carries power `n - 1 - idx`.
        let n = codeword.len();
        let positions: Vec<usize> = (0..n)
            .filter(|&idx| {
                let power = n - 1 - idx;
                eval_le(&locator, alpha_pow(255 - power % 255)) == 0
            })
            .collect();
        if positions.len() != n_errors {
            return None;
        }

        // Forney: Ω(x) = S(x)Λ(x) mod x^ecc
        let mut omega = vec![0u8; self.ecc_len];
        for (i, &s) in syndromes.iter().enumerate() {
            for (j, &l) in locator.iter().enumerate() {
                if i + j < self.ecc_len {
                    omega[i + j] ^= mul(s, l);
                }
            }
        }
        // formal derivative: only odd powers survive in characteristic 2
        let derivative: Vec<u8> = locator
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &l)| if i % 2 == 1 { l } else { 0 })
            .collect();

        let mut corrected = codeword.to_vec();
        for &idx in &positions {
            let x = alpha_pow(n - 1 - idx);
            let x_inv = div(1, x);
            let denom = eval_le(&derivative, x_inv);
            if denom == 0 {
                return None;
            }
            let magnitude = div(mul(x, eval_le(&omega, x_inv)), denom);
            corrected[idx] ^= magnitude;
        }

        if self.syndromes(&corrected).iter().any(|&s| s != 0) {
            return None;
        }
        corrected.truncate(self.msg_len);
        Some(corrected)
    }

    fn syndromes(&self, codeword: &[u8]) -> Vec<u8> {
        (0..self.ecc_len)
            .map(|i| eval_be(codeword, alpha_pow(i)))
            .collect()
    }
}

/// Error locator Λ(x), lowest degree first, trailing zeros stripped.
fn berlekamp_massey(syndromes: &[u8]) -> Vec<u8> {
    let mut c = vec![1u8];
    let mut b = vec![1u8];
    let mut l = 0usize;
    let mut m = 1usize;
    let mut last_d = 1u8;

    for n in 0..syndromes.len() {
        let mut d = syndromes[n];
        for i in 1..=l.min(c.len() - 1) {
            d ^= mul(c[i], syndromes[n - i]);
        }

        if d == 0 {
            m += 1;
            continue;
        }

        let coef = div(d, last_d);
        let previous = c.clone();
        if c.len() < b.len() + m {
            c.resize(b.len() + m, 0);
        }
        for (i, &bi) in b.iter().enumerate() {
            c[i + m] ^= mul(coef, bi);
        }

        if 2 * l <= n {
            l = n + 1 - l;
            b = previous;
            last_d = d;
            m = 1;
        } else {
            m += 1;
        }
    }

    while c.len() > 1 && c.last() == Some(&0) {
        c.pop();
    }
    c
}
