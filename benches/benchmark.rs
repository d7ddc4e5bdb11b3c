use benchmark_simple::*;
use jose_simple::prelude::*;

fn main() {
    let bench = Bench::new();

    let options = &Options {
        iterations: 1000,
        warmup_iterations: 100,
        min_samples: 5,
        max_samples: 10,
        max_rsd: 1.0,
        ..Default::default()
    };

    let store = KeyStore::new();
    let rsa = store.generate("RSA", 2048, KeyProps::default()).unwrap();
    let ec = store.generate("EC", "P-256", KeyProps::default()).unwrap();
    let oct = store.generate("oct", 128, KeyProps::default()).unwrap();

    let compact = || SignOptions {
        format: Format::Compact,
        ..Default::default()
    };

    let jws = sign(compact(), [rsa.clone()], b"payload").unwrap().to_string();
    let res = bench.run(options, || sign(compact(), [rsa.clone()], b"payload").unwrap());
    println!("rsa-2048 - sign: {}", res.throughput(1));

    let verifier = Verifier::new(store.clone());
    let res = bench.run(options, || verifier.verify(&jws).unwrap());
    println!("rsa-2048 - verify: {}", res.throughput(1));

    let jws = sign(compact(), [ec.clone()], b"payload").unwrap().to_string();
    let res = bench.run(options, || sign(compact(), [ec.clone()], b"payload").unwrap());
    println!("p-256 - sign: {}", res.throughput(1));

    let res = bench.run(options, || verifier.verify(&jws).unwrap());
    println!("p-256 - verify: {}", res.throughput(1));

    let plaintext = vec![0u8; 4096];
    let jwe = encrypt(EncryptOptions::default(), [oct.clone()], &plaintext)
        .unwrap()
        .to_string();
    let res = bench.run(options, || {
        encrypt(EncryptOptions::default(), [oct.clone()], &plaintext).unwrap()
    });
    println!("a128kw + a128cbc-hs256 - encrypt 4k: {}", res.throughput(1));

    let decrypter = Decrypter::new(store);
    let res = bench.run(options, || decrypter.decrypt(&jwe).unwrap());
    println!("a128kw + a128cbc-hs256 - decrypt 4k: {}", res.throughput(1));
}
