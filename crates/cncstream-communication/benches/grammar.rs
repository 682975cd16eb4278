use cncstream_communication::Dialect;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const LINES: [&str; 8] = [
    "ok",
    "<Run|MPos:12.345,67.890,-1.250|Bf:14,96|FS:1200,12000|WCO:0.000,0.000,-10.000>",
    "<Idle|MPos:0.000,0.000,0.000|FS:0,0|Ov:100,100,100>",
    "[GC:G1 G54 G17 G21 G90 G94 M3 M9 T1 F1200 S12000]",
    "error:20",
    "$110=5000.000",
    "[MSG:Pgm End]",
    "[PRB:0.000,0.000,-7.250:1]",
];

fn bench_grammar(c: &mut Criterion) {
    c.bench_function("grbl_parse_mixed", |b| {
        b.iter(|| {
            for line in LINES {
                black_box(Dialect::GRBL.parse(black_box(line)));
            }
        })
    });

    c.bench_function("fluidnc_parse_mixed", |b| {
        b.iter(|| {
            for line in LINES {
                black_box(Dialect::FLUIDNC.parse(black_box(line)));
            }
        })
    });
}

criterion_group!(benches, bench_grammar);
criterion_main!(benches);
