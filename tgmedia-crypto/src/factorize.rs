//! Pollard-rho (Brent variant) factorization of the 64-bit `pq` challenge.

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn step(y: u128, c: u128, n: u128) -> u128 {
    (y * y % n + c) % n
}

fn abs_diff(a: u128, b: u128) -> u128 { a.max(b) - a.min(b) }

// Well past what a 64-bit challenge with two 32-bit primes ever needs.
const MAX_ROUND: u128 = 1 << 24;

fn brent(n: u128, c: u128) -> Option<u128> {
    let m = 7 * (n / 13) + 1;
    let mut y = 3 * (n / 7);
    let (mut g, mut r, mut q) = (1u128, 1u128, 1u128);
    let (mut x, mut ys) = (0u128, 0u128);

    while g == 1 {
        if r > MAX_ROUND {
            return None;
        }
        x = y;
        for _ in 0..r { y = step(y, c, n); }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..m.min(r - k) {
                y = step(y, c, n);
                q = q * abs_diff(x, y) % n;
            }
            g = gcd(q, n);
            k += m;
        }
        r *= 2;
    }

    if g == n {
        // the batched product collapsed; walk back one step at a time
        loop {
            ys = step(ys, c, n);
            g = gcd(abs_diff(x, ys), n);
            if g > 1 { break; }
        }
    }

    (g != 1 && g != n).then_some(g)
}

/// Split `pq` into `(p, q)` with `p <= q`, or `None` if no factor was found
/// (prime or degenerate input).
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 {
        return None;
    }
    if pq % 2 == 0 {
        return Some((2, pq / 2));
    }
    let n = pq as u128;
    [43u128, 47, 53, 59, 61].into_iter().find_map(|seed| {
        let g = brent(n, seed * (n / 103))? as u64;
        let other = pq / g;
        Some((g.min(other), g.max(other)))
    })
}
