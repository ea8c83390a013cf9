//! SNMPv3 security benchmarks.
//!
//! Key localization runs once per engine; HMAC and the ciphers run on every
//! secured message.

use std::sync::Arc;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use snmp_wire::message::{Message, MessageOptions, SecurityLevel};
use snmp_wire::v3::{AuthProtocol, LocalizedKey, PrivKey, PrivProtocol, UsmConfig, UsmSecurityParams};
use snmp_wire::{Pdu, PduKind, Value, Version, oid};
use std::hint::black_box;

const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x80\xe9\xb1\x04\x61\x73\x61\x00\x00\x00";
const PASSWORD: &[u8] = b"maplesyrup";

const AUTH: [(&str, AuthProtocol); 2] = [("MD5", AuthProtocol::Md5), ("SHA-1", AuthProtocol::Sha1)];

/// The slow path: 1 MiB expansion, hash and localization.
fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_key_derivation");
    group.sample_size(10);

    for (name, protocol) in AUTH {
        group.bench_function(BenchmarkId::new("from_password", name), |b| {
            b.iter(|| black_box(LocalizedKey::from_password(protocol, PASSWORD, ENGINE_ID).unwrap()))
        });
    }

    group.finish();
}

fn bench_hmac(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_hmac");

    for (name, protocol) in AUTH {
        let key = LocalizedKey::from_password(protocol, PASSWORD, ENGINE_ID).unwrap();
        for size in [64, 256, 1024] {
            let data = vec![0xABu8; size];
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("compute_{}", name), size),
                &data,
                |b, data| b.iter(|| black_box(key.compute_hmac(data).unwrap())),
            );
        }

        let data = vec![0xABu8; 256];
        let mac = key.compute_hmac(&data).unwrap();
        group.bench_function(format!("verify_{}_256bytes", name), |b| {
            b.iter(|| black_box(key.verify_hmac(&data, &mac).is_ok()))
        });
    }

    group.finish();
}

fn bench_privacy(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_privacy");

    let keys = [
        (
            "DES",
            PrivKey::from_password(AuthProtocol::Md5, PrivProtocol::Des, PASSWORD, ENGINE_ID)
                .unwrap(),
        ),
        (
            "AES-128",
            PrivKey::from_password(AuthProtocol::Sha1, PrivProtocol::Aes128, PASSWORD, ENGINE_ID)
                .unwrap(),
        ),
    ];
    let (engine_boots, engine_time) = (100u32, 12345u32);

    for (name, key) in &keys {
        for size in [64, 256, 512] {
            let plaintext = vec![0xABu8; size];
            group.throughput(Throughput::Bytes(size as u64));

            group.bench_with_input(
                BenchmarkId::new(format!("encrypt_{}", name), size),
                &plaintext,
                |b, data| b.iter(|| black_box(key.encrypt(data, engine_boots, engine_time).unwrap())),
            );

            let (ciphertext, salt) = key.encrypt(&plaintext, engine_boots, engine_time).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("decrypt_{}", name), size),
                &(ciphertext, salt),
                |b, (ct, salt)| {
                    b.iter(|| black_box(key.decrypt(ct, engine_boots, engine_time, salt).unwrap()))
                },
            );
        }
    }

    group.finish();
}

/// Full authPriv message: build, sign and encrypt, then verify and decrypt.
fn bench_auth_priv_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_message");

    let keys = Arc::new(
        UsmConfig::new("benchuser")
            .auth(AuthProtocol::Sha1, PASSWORD)
            .unwrap()
            .privacy(PrivProtocol::Aes128, PASSWORD)
            .unwrap()
            .localize(ENGINE_ID)
            .unwrap(),
    );
    let options = MessageOptions {
        level: SecurityLevel::AuthPriv,
        security: UsmSecurityParams::new(ENGINE_ID, 100, 12345, "benchuser"),
        keys: Some(Arc::clone(&keys)),
        ..MessageOptions::default()
    };
    let mut pdu = Pdu::build(PduKind::RESPONSE, Version::V3, 4711, Bytes::new());
    for i in 0..10 {
        pdu.add_varbind(
            oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 10).child(i),
            Value::Counter32(i * 1000),
        );
    }

    group.bench_function("outgoing_10_varbinds", |b| {
        b.iter(|| {
            black_box(
                Message::build(pdu.clone(), &options)
                    .unwrap()
                    .to_bytes()
                    .unwrap(),
            )
        })
    });

    let encoded = Message::build(pdu, &options).unwrap().to_bytes().unwrap();
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("incoming_10_varbinds", |b| {
        b.iter(|| black_box(Message::decode(encoded.clone(), Some(&*keys)).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_hmac,
    bench_privacy,
    bench_auth_priv_message,
);

criterion_main!(benches);
