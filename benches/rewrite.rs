use criterion::{criterion_group, criterion_main, Criterion};
use jvmti_watermark::config::AgentConfig;
use jvmti_watermark::console::Console;
use jvmti_watermark::identity::InstallationIdentity;
use jvmti_watermark::marker::MarkerLayout;
use jvmti_watermark::source::{ClassFileLoad, HeapSource};
use jvmti_watermark::WatermarkAgent;

const MARKER: &[u8] = b"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx0";

/// A class-sized buffer with the marker string near the end of the
/// constant pool, behind a run of unrelated bytes.
fn build_class(filler: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(filler + MARKER.len() + 16);
    bytes.extend_from_slice(&0xCAFEBABE_u32.to_be_bytes());
    bytes.extend_from_slice(&0_u16.to_be_bytes());
    bytes.extend_from_slice(&52_u16.to_be_bytes());
    bytes.extend((0..filler).map(|i| b"abcdefgwxyz\x01\x07\x08"[i % 14]));
    bytes.push(1);
    bytes.extend_from_slice(&(MARKER.len() as u16).to_be_bytes());
    bytes.extend_from_slice(MARKER);
    bytes.extend_from_slice(&0x0021_u16.to_be_bytes());
    bytes
}

fn bench_stamp(c: &mut Criterion) {
    let layout = MarkerLayout::default();
    let identity = InstallationIdentity::DEFAULT;
    let class = build_class(4096);
    c.bench_function("stamp_4k_class", |b| {
        b.iter(|| {
            let mut buf = class.clone();
            layout.stamp(&mut buf, identity).unwrap();
        })
    });
}

fn bench_class_file_load(c: &mut Criterion) {
    let console = Console::new(std::io::sink(), std::io::sink());
    let agent = WatermarkAgent::new(AgentConfig::default(), console);
    let source = HeapSource::new();
    let class = build_class(64 * 1024);
    c.bench_function("class_file_load_64k_target", |b| {
        b.iter(|| {
            let load = ClassFileLoad {
                name: Some("io/simonis/InstrumentationTest".as_bytes()),
                loader: std::ptr::null_mut(),
                being_redefined: false,
                class_data: &class,
            };
            agent.on_class_file_load(&source, &load).unwrap();
        })
    });
    c.bench_function("class_file_load_non_target", |b| {
        b.iter(|| {
            let load = ClassFileLoad {
                name: Some("java/lang/String".as_bytes()),
                loader: std::ptr::null_mut(),
                being_redefined: false,
                class_data: &class,
            };
            assert!(agent.on_class_file_load(&source, &load).is_none());
        })
    });
}

criterion_group!(benches, bench_stamp, bench_class_file_load);
criterion_main!(benches);
