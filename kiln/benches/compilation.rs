use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiln::Compiler;

const PROGRAM: &str = r#"
fn float sum(values: float[], count: int) {
    var total: float = 0;
    var i: int = 0;
    while (i < count) {
        total += values[i];
        i = i + 1;
    }
    return total;
}

fn int main() {
    var data: float[20] = {1.0, 2.0, 3.5};
    var heap: int[] = new int[64];
    var name: str = input("name? ");
    if (name == "lei" && strlen(name) > 0) {
        print(sum(data, 20));
    } else {
        print(false);
    }
    free(heap);
    return 0;
}
"#;

fn pipeline(c: &mut Criterion) {
    let compiler = Compiler::new();
    c.bench_function("compile_source", |b| {
        b.iter(|| compiler.compile_source(black_box(PROGRAM)))
    });

    let mut diagnostics = lei::errors::Diagnostics::new();
    c.bench_function("front_end_only", |b| {
        b.iter(|| {
            diagnostics.clear();
            lei::check(black_box(PROGRAM), 256, &mut diagnostics)
        })
    });
}

criterion_group!(benches, pipeline);
criterion_main!(benches);
