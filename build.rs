fn main() {
    // Bundled libpdfium lives in Contents/Frameworks on macOS
    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/../Frameworks");
    }

    tauri_build::build()
}
