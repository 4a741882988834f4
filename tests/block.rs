use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use snappy_framed::{
    compress, compress_with_context, get_uncompressed_length, max_compressed_length, uncompress,
    uncompress_into, CompressionContext, Error,
};

/// Data whose compressed size lands near `ratio` of the original: short
/// random fragments repeated out to 100-byte runs.
fn compressible_data(rng: &mut StdRng, ratio: f64, len: usize) -> Vec<u8> {
    let fragment_len = ((100.0 * ratio) as usize).max(1);
    let mut data = Vec::with_capacity(len + 100);
    while data.len() < len {
        let mut fragment = vec![0u8; fragment_len];
        rng.fill_bytes(&mut fragment);
        let mut run = 0;
        while run < 100 {
            let take = fragment.len().min(100 - run);
            data.extend_from_slice(&fragment[..take]);
            run += take;
        }
    }
    data.truncate(len);
    data
}

#[test]
fn round_trip_every_small_length() {
    let mut rng = StdRng::seed_from_u64(301);
    let pool = compressible_data(&mut rng, 0.5, 1 << 17);
    for len in (0..2048).chain((2048..pool.len()).step_by(997)) {
        let input = &pool[..len];
        let block = compress(input).unwrap();
        assert!(block.len() <= max_compressed_length(len));
        assert_eq!(uncompress(&block).unwrap(), input, "length {}", len);
    }
}

#[test]
fn round_trip_incompressible() {
    let mut rng = StdRng::seed_from_u64(17);
    for len in [1, 100, 5000, 70_000] {
        let mut input = vec![0u8; len];
        rng.fill_bytes(&mut input);
        let block = compress(&input).unwrap();
        assert!(block.len() <= max_compressed_length(len));
        assert_eq!(uncompress(&block).unwrap(), input);
    }
}

#[test]
fn sixty_four_kib_of_zeros() {
    let input = vec![0u8; 65536];
    let block = compress(&input).unwrap();
    assert!(block.len() < input.len() / 10);
    assert_eq!(uncompress(&block).unwrap(), input);
}

#[test]
fn declared_length_is_readable_without_decoding() {
    let block = compress(&vec![7u8; 12345]).unwrap();
    let (declared, prefix) = get_uncompressed_length(&block).unwrap();
    assert_eq!(declared, 12345);
    assert_eq!(prefix, 2);
}

#[test]
fn shared_context_across_inputs() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut ctx = CompressionContext::new();
    let mut out = vec![0u8; max_compressed_length(1 << 16)];
    for _ in 0..20 {
        let len = rng.gen_range(0..=1 << 16);
        let input = compressible_data(&mut rng, 0.3, len);
        let written = compress_with_context(&input, &mut out, &mut ctx).unwrap();
        assert_eq!(uncompress(&out[..written]).unwrap(), input);
    }
}

#[test]
fn reference_codec_reads_our_blocks() {
    let mut rng = StdRng::seed_from_u64(301);
    for len in [0, 1, 64, 1000, 32768, 65536, 100_000] {
        let input = compressible_data(&mut rng, 0.5, len);
        let block = compress(&input).unwrap();
        let decoded = snap::raw::Decoder::new().decompress_vec(&block).unwrap();
        assert_eq!(decoded, input, "length {}", len);
    }
}

#[test]
fn we_read_reference_codec_blocks() {
    let mut rng = StdRng::seed_from_u64(302);
    for len in [1, 64, 1000, 32768, 65536, 100_000] {
        let input = compressible_data(&mut rng, 0.5, len);
        let block = snap::raw::Encoder::new().compress_vec(&input).unwrap();
        assert_eq!(uncompress(&block).unwrap(), input, "length {}", len);
    }
}

#[test]
fn random_garbage_never_panics() {
    let mut rng = StdRng::seed_from_u64(4242);
    for _ in 0..2000 {
        let len = rng.gen_range(0..512);
        let mut junk = vec![0u8; len];
        rng.fill_bytes(&mut junk);
        match uncompress(&junk) {
            Ok(out) => {
                let (declared, _) = get_uncompressed_length(&junk).unwrap();
                assert_eq!(out.len(), declared as usize);
            }
            Err(Error::Corruption { .. }) => {}
            Err(other) => panic!("unexpected error kind: {:?}", other),
        }
    }
}

#[test]
fn mutated_valid_blocks_never_panic() {
    let mut rng = StdRng::seed_from_u64(5151);
    let input = compressible_data(&mut rng, 0.4, 4096);
    let block = compress(&input).unwrap();
    for _ in 0..2000 {
        let mut mutated = block.clone();
        for _ in 0..rng.gen_range(1..4) {
            let at = rng.gen_range(0..mutated.len());
            mutated[at] = rng.gen();
        }
        let _ = uncompress(&mutated);
    }
}

#[test]
fn truncated_blocks_never_panic() {
    let mut rng = StdRng::seed_from_u64(6161);
    let input = compressible_data(&mut rng, 0.4, 4096);
    let block = compress(&input).unwrap();
    for cut in 0..block.len() {
        match uncompress(&block[..cut]) {
            Ok(out) => assert!(out.is_empty()),
            Err(Error::Corruption { offset, .. }) => assert!(offset <= cut),
            Err(other) => panic!("unexpected error kind: {:?}", other),
        }
    }
}

#[test]
fn uncompress_into_exact_buffer() {
    let input = b"exactly sized destination buffer";
    let block = compress(input).unwrap();
    let mut out = vec![0u8; input.len()];
    assert_eq!(uncompress_into(&block, &mut out).unwrap(), input.len());
    assert_eq!(&out, input);
}
