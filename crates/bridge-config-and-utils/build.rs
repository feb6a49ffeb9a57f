fn main() {
    // option_env!() values are cached by cargo; rebuild when they change.
    println!("cargo:rerun-if-env-changed=DOCBRIDGE_HANDSHAKE_URL");
    println!("cargo:rerun-if-env-changed=DOCBRIDGE_PROVIDER_URL");
    println!("cargo:rerun-if-env-changed=DOCBRIDGE_APP_SLUG");
}
