use davsync_crypto::{decrypt, encrypt, CodecParams};
use secrecy::SecretString;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn params() -> CodecParams {
    // Low KDF cost so the numbers reflect the AEAD path
    CodecParams::with_rounds(1)
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let password = SecretString::from("bench-password");
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt(
                divan::black_box(&data),
                divan::black_box(&password),
                &params(),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let password = SecretString::from("bench-password");
    let data = make_data(size);
    let encrypted = encrypt(&data, &password, &params()).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt(
                divan::black_box(&encrypted),
                divan::black_box(&password),
                &params(),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1000, 20000])]
fn bench_kdf_rounds(bencher: divan::Bencher, rounds: u32) {
    let password = SecretString::from("bench-password");
    let salt = [7u8; davsync_crypto::SALT_SIZE];
    bencher.bench(|| davsync_crypto::derive_key(&password, &salt, rounds).unwrap());
}

fn main() {
    divan::main();
}
