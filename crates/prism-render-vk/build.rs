use std::{env, fs, path::PathBuf};

// Vertex-input-free triangle: positions and colours come from gl_VertexIndex.
// Screen-space order top, bottom-right, bottom-left is clockwise, which the
// pipeline treats as front-facing.
const TRI_VERT: &str = r#"
#version 450
layout(location = 0) out vec3 vColor;

const vec2 POSITIONS[3] = vec2[](
    vec2( 0.0, -0.5),
    vec2( 0.5,  0.5),
    vec2(-0.5,  0.5)
);

const vec3 COLORS[3] = vec3[](
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0)
);

void main() {
    gl_Position = vec4(POSITIONS[gl_VertexIndex], 0.0, 1.0);
    vColor = COLORS[gl_VertexIndex];
}
"#;

const TRI_FRAG: &str = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

fn compile(
    comp: &shaderc::Compiler,
    opts: &shaderc::CompileOptions,
    src: &str,
    kind: shaderc::ShaderKind,
    name: &str,
    out: &PathBuf,
) {
    let spv = comp
        .compile_into_spirv(src, kind, name, "main", Some(opts))
        .unwrap_or_else(|e| panic!("compiling {name}: {e}"));
    fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
}

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_2 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    compile(&comp, &opts, TRI_VERT, shaderc::ShaderKind::Vertex, "tri.vert", &out);
    compile(&comp, &opts, TRI_FRAG, shaderc::ShaderKind::Fragment, "tri.frag", &out);

    println!("cargo:rerun-if-changed=build.rs");
}
