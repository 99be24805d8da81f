error_chain! {
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
    }

    errors {
        UnknownBone(name: String) {
            description("influence references a bone the skeleton doesn't contain")
            display("influence references unknown bone: {}", name)
        }
        SingularBindMatrix(bone: String) {
            description("bone bind matrix has zero determinant")
            display("bind matrix for bone {} is not invertible", bone)
        }
    }
}
